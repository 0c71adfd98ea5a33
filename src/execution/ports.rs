//! Capability interfaces for everything the pipeline does not own.
//!
//! Each trait has exactly one method so that callers can wire a different
//! collaborator per concern and tests can substitute deterministic fakes. All
//! fallible methods return `anyhow::Result`; the reliability layer turns the
//! error into the canonical taxonomy.

use crate::decision::swap::SwapQuote;
use crate::execution::builder::ExitQuote;
use crate::execution::receipt::ReceiptAccount;
use crate::types::{Bounds, Cluster, Pubkey};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::address_lookup_table::AddressLookupTableAccount;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;

/// Token amounts freed by removing all liquidity at the current price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovePreview {
    pub token_a_out: u64,
    pub token_b_out: u64,
}

/// Already-decoded position and pool state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSnapshot {
    pub cluster: Cluster,
    pub whirlpool: Pubkey,
    pub position: Pubkey,
    pub position_mint: Pubkey,
    pub current_tick_index: i32,
    pub lower_tick_index: i32,
    pub upper_tick_index: i32,
    pub tick_spacing: u16,
    pub liquidity: u128,
    pub token_mint_a: Pubkey,
    pub token_mint_b: Pubkey,
    pub token_vault_a: Pubkey,
    pub token_vault_b: Pubkey,
    pub token_program_a: Pubkey,
    pub token_program_b: Pubkey,
    pub tick_array_lower: Pubkey,
    pub tick_array_upper: Pubkey,
    pub remove_preview: Option<RemovePreview>,
    /// Slot the snapshot was read at
    pub observed_slot: u64,
}

impl PositionSnapshot {
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.lower_tick_index, self.upper_tick_index)
    }

    pub fn in_range(&self) -> bool {
        self.bounds().contains(self.current_tick_index)
    }

    /// Token program for a mint of this pool, falling back to the legacy program.
    pub fn token_program_for(&self, mint: &Pubkey) -> Pubkey {
        if *mint == self.token_mint_a {
            self.token_program_a
        } else if *mint == self.token_mint_b {
            self.token_program_b
        } else {
            crate::execution::ata::TOKEN_PROGRAM_ID
        }
    }
}

/// Pool accounts a router needs to build a swap through the position's pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapContext {
    pub whirlpool: Pubkey,
    pub tick_spacing: u16,
    pub tick_current_index: i32,
    pub tick_arrays: Vec<Pubkey>,
    pub token_mint_a: Pubkey,
    pub token_mint_b: Pubkey,
    pub token_vault_a: Pubkey,
    pub token_vault_b: Pubkey,
    pub token_program_a: Pubkey,
    pub token_program_b: Pubkey,
    pub a_to_b: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub cluster: Cluster,
    pub in_mint: Pubkey,
    pub out_mint: Pubkey,
    pub swap_in_amount: u64,
    pub slippage_bps_cap: u16,
    pub context: SwapContext,
}

#[derive(Debug, Clone, Default)]
pub struct SwapInstructions {
    pub instructions: Vec<Instruction>,
    pub lookup_tables: Vec<AddressLookupTableAccount>,
}

/// What a simulation reported back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationDiagnostics {
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
    /// False when the node could not load an account the message references
    pub accounts_resolved: bool,
}

impl SimulationDiagnostics {
    pub fn success(units_consumed: u64) -> Self {
        Self {
            err: None,
            logs: Vec::new(),
            units_consumed: Some(units_consumed),
            accounts_resolved: true,
        }
    }
}

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self, position: &Pubkey) -> Result<PositionSnapshot>;
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<SwapQuote>;
}

#[async_trait]
pub trait SwapInstructionSource: Send + Sync {
    async fn swap_instructions(
        &self,
        quote: &SwapQuote,
        authority: &Pubkey,
        context: &SwapContext,
    ) -> Result<SwapInstructions>;
}

#[async_trait]
pub trait Simulator: Send + Sync {
    async fn simulate(&self, transaction: &VersionedTransaction) -> Result<SimulationDiagnostics>;
}

/// Signs with the authority's wallet and submits.
#[async_trait]
pub trait TransactionSender: Send + Sync {
    async fn sign_and_send(&self, transaction: &VersionedTransaction) -> Result<Signature>;
}

/// How a sent transaction settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Confirmation {
    Confirmed,
    /// Landed but the runtime rejected it
    Failed(String),
    /// The blockhash aged out before the signature was seen
    Expired,
}

/// Waits for a sent transaction to reach confirmed commitment.
#[async_trait]
pub trait TransactionConfirmer: Send + Sync {
    async fn confirm(&self, signature: &Signature, blockhash: &Hash) -> Result<Confirmation>;
}

#[async_trait]
pub trait ReceiptFetcher: Send + Sync {
    async fn fetch_receipt(&self, receipt: &Pubkey) -> Result<Option<ReceiptAccount>>;
}

#[async_trait]
pub trait BlockhashSource: Send + Sync {
    async fn latest_blockhash(&self) -> Result<Hash>;
}

#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn balance(&self, owner: &Pubkey) -> Result<u64>;
}

#[async_trait]
pub trait AccountLookup: Send + Sync {
    async fn account_exists(&self, address: &Pubkey) -> Result<bool>;
}

#[async_trait]
pub trait RentSource: Send + Sync {
    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64>;
}

#[async_trait]
pub trait SlotSource: Send + Sync {
    async fn current_slot(&self) -> Result<u64>;
}

/// Produces a fresh snapshot and quote when the builder finds its quote stale.
#[async_trait]
pub trait ExitRebuilder: Send + Sync {
    async fn rebuild(&self) -> Result<(PositionSnapshot, ExitQuote)>;
}

pub trait Clock: Send + Sync {
    fn now_unix_ms(&self) -> i64;
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `chrono`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
