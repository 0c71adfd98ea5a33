//! Deterministic fakes for every capability the pipeline consumes.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use clmm_autopilot::config::AutopilotConfig;
use clmm_autopilot::decision::mints::{SOL_MINT, USDC_DEVNET_MINT};
use clmm_autopilot::decision::SwapQuote;
use clmm_autopilot::execution::ata::TOKEN_PROGRAM_ID;
use clmm_autopilot::execution::whirlpool::MEMO_PROGRAM_ID;
use clmm_autopilot::execution::{
    AccountLookup, BalanceSource, BlockhashSource, Clock, Confirmation, Connectors, PositionSnapshot, QuoteRequest,
    QuoteSource, ReceiptAccount, ReceiptFetcher, RemovePreview, RentSource, SimulationDiagnostics, Simulator,
    Sleeper, SlotSource, SnapshotSource, SwapContext, SwapInstructionSource, SwapInstructions,
    TransactionConfirmer, TransactionSender,
};
use clmm_autopilot::types::{Cluster, Pubkey, Sample};
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NOW_MS: i64 = 1_700_000_000_000;

/// Manual clock; `step_ms` advances it on every read.
#[derive(Default)]
pub struct FakeClock {
    now: AtomicI64,
    step_ms: AtomicI64,
}

impl FakeClock {
    pub fn at(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
            step_ms: AtomicI64::new(0),
        }
    }

    pub fn stepping(now_ms: i64, step_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
            step_ms: AtomicI64::new(step_ms),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_unix_ms(&self) -> i64 {
        let step = self.step_ms.load(Ordering::SeqCst);
        self.now.fetch_add(step, Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingSleeper(pub Mutex<Vec<u64>>);

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.0.lock().unwrap().push(duration.as_millis() as u64);
    }
}

pub fn sol_usdc_snapshot(current_tick_index: i32) -> PositionSnapshot {
    PositionSnapshot {
        cluster: Cluster::Devnet,
        whirlpool: Pubkey::new_unique(),
        position: Pubkey::new_unique(),
        position_mint: Pubkey::new_unique(),
        current_tick_index,
        lower_tick_index: 100,
        upper_tick_index: 200,
        tick_spacing: 64,
        liquidity: 1_000_000,
        token_mint_a: SOL_MINT,
        token_mint_b: USDC_DEVNET_MINT,
        token_vault_a: Pubkey::new_unique(),
        token_vault_b: Pubkey::new_unique(),
        token_program_a: TOKEN_PROGRAM_ID,
        token_program_b: TOKEN_PROGRAM_ID,
        tick_array_lower: Pubkey::new_unique(),
        tick_array_upper: Pubkey::new_unique(),
        remove_preview: Some(RemovePreview {
            token_a_out: 2_000_000_000,
            token_b_out: 50_000_000,
        }),
        observed_slot: 1_000,
    }
}

/// Three consecutive samples below a `[100, 200]` range.
pub fn samples_below() -> Vec<Sample> {
    vec![Sample::new(1, 1000, 95), Sample::new(2, 1001, 94), Sample::new(3, 1002, 93)]
}

pub fn samples_in_range() -> Vec<Sample> {
    vec![Sample::new(1, 1000, 150), Sample::new(2, 1001, 151), Sample::new(3, 1002, 152)]
}

pub fn test_config() -> AutopilotConfig {
    let mut config = AutopilotConfig::default();
    config.policy.required_consecutive = 3;
    config.policy.cadence_ms = 1_000;
    config.policy.cooldown_ms = 10_000;
    config.reliability.retry_backoff_ms = vec![10, 20];
    config.execution.receipt_poll_interval_ms = 5;
    config
}

pub struct FakeSnapshots {
    pub snapshot: Mutex<PositionSnapshot>,
    pub calls: AtomicU32,
}

#[async_trait]
impl SnapshotSource for FakeSnapshots {
    async fn fetch_snapshot(&self, position: &Pubkey) -> Result<PositionSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.snapshot.lock().unwrap().clone();
        if snapshot.position != *position {
            return Err(anyhow!("position {position} not found"));
        }
        Ok(snapshot)
    }
}

/// Quotes 1:1 minus slippage, stamped with the shared clock.
pub struct FakeQuotes {
    pub clock: Arc<FakeClock>,
    pub slippage_bps: u16,
    pub calls: AtomicU32,
    pub requests: Mutex<Vec<QuoteRequest>>,
}

#[async_trait]
impl QuoteSource for FakeQuotes {
    async fn quote(&self, request: &QuoteRequest) -> Result<SwapQuote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let min_out = request.swap_in_amount - request.swap_in_amount * u64::from(self.slippage_bps) / 10_000;
        Ok(SwapQuote {
            router: clmm_autopilot::decision::SwapRouter::Orca,
            in_mint: request.in_mint,
            out_mint: request.out_mint,
            swap_in_amount: request.swap_in_amount,
            swap_min_out_amount: min_out,
            slippage_bps: self.slippage_bps,
            quoted_at_unix_ms: self.clock.now_unix_ms(),
            debug: None,
        })
    }
}

pub fn marker_instruction(signer: &Pubkey, tag: &str) -> Instruction {
    Instruction {
        program_id: MEMO_PROGRAM_ID,
        accounts: vec![AccountMeta::new_readonly(*signer, true)],
        data: tag.as_bytes().to_vec(),
    }
}

#[derive(Default)]
pub struct FakeSwaps {
    pub calls: AtomicU32,
}

#[async_trait]
impl SwapInstructionSource for FakeSwaps {
    async fn swap_instructions(
        &self,
        _quote: &SwapQuote,
        authority: &Pubkey,
        _context: &SwapContext,
    ) -> Result<SwapInstructions> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SwapInstructions {
            instructions: vec![marker_instruction(authority, "swap")],
            lookup_tables: Vec::new(),
        })
    }
}

pub struct FakeSimulator {
    pub result: Mutex<SimulationDiagnostics>,
    pub calls: AtomicU32,
}

impl FakeSimulator {
    pub fn passing() -> Self {
        Self {
            result: Mutex::new(SimulationDiagnostics::success(150_000)),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(err: &str, logs: &[&str]) -> Self {
        Self {
            result: Mutex::new(SimulationDiagnostics {
                err: Some(err.to_string()),
                logs: logs.iter().map(|l| l.to_string()).collect(),
                units_consumed: Some(10_000),
                accounts_resolved: true,
            }),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Simulator for FakeSimulator {
    async fn simulate(&self, _transaction: &VersionedTransaction) -> Result<SimulationDiagnostics> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.lock().unwrap().clone())
    }
}

/// Receipt accounts keyed by address, written by [`FakeSender`].
#[derive(Default)]
pub struct FakeChain {
    pub receipts: Mutex<HashMap<Pubkey, ReceiptAccount>>,
    pub receipt_fetches: AtomicU32,
    /// Receipts stay invisible to fetches while this is set
    pub hide_receipts: AtomicBool,
}

#[async_trait]
impl ReceiptFetcher for FakeChain {
    async fn fetch_receipt(&self, receipt: &Pubkey) -> Result<Option<ReceiptAccount>> {
        self.receipt_fetches.fetch_add(1, Ordering::SeqCst);
        if self.hide_receipts.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.receipts.lock().unwrap().get(receipt).cloned())
    }
}

/// Sends by executing the record instruction against [`FakeChain`].
pub struct FakeSender {
    pub chain: Arc<FakeChain>,
    /// Errors returned by the next sends, in order
    pub failures: Mutex<VecDeque<String>>,
    pub sent: Mutex<Vec<VersionedTransaction>>,
    /// Flips one bit of the stored hash
    pub corrupt_receipt: AtomicBool,
}

#[async_trait]
impl TransactionSender for FakeSender {
    async fn sign_and_send(&self, transaction: &VersionedTransaction) -> Result<Signature> {
        if let Some(failure) = self.failures.lock().unwrap().pop_front() {
            return Err(anyhow!(failure));
        }
        self.sent.lock().unwrap().push(transaction.clone());

        let keys = transaction.message.static_account_keys();
        let record = transaction
            .message
            .instructions()
            .last()
            .ok_or_else(|| anyhow!("empty transaction"))?;
        let data = &record.data;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&data[45..77]);
        if self.corrupt_receipt.load(Ordering::SeqCst) {
            hash[0] ^= 1;
        }
        let receipt = ReceiptAccount {
            authority: keys[usize::from(record.accounts[0])],
            position_mint: Pubkey::try_from(&data[13..45]).map_err(|e| anyhow!("{e}"))?,
            epoch: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            direction: data[12],
            attestation_hash: hash,
            slot: 2_000,
            unix_ts: NOW_MS / 1000,
            bump: 255,
        };
        let address = keys[usize::from(record.accounts[1])];
        self.chain.receipts.lock().unwrap().insert(address, receipt);
        Ok(Signature::new_unique())
    }
}

/// Reports a fixed settlement for every signature.
pub struct FakeConfirmer {
    pub outcome: Mutex<Confirmation>,
    pub calls: AtomicU32,
}

impl FakeConfirmer {
    pub fn settling(outcome: Confirmation) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl TransactionConfirmer for FakeConfirmer {
    async fn confirm(&self, _signature: &Signature, _blockhash: &Hash) -> Result<Confirmation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeBlockhashes {
    pub calls: AtomicU32,
}

#[async_trait]
impl BlockhashSource for FakeBlockhashes {
    async fn latest_blockhash(&self) -> Result<Hash> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Hash::new_unique())
    }
}

pub struct FakeBalance(pub AtomicU64);

#[async_trait]
impl BalanceSource for FakeBalance {
    async fn balance(&self, _owner: &Pubkey) -> Result<u64> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

/// Every account exists; nothing needs creating.
pub struct AllAccountsExist;

#[async_trait]
impl AccountLookup for AllAccountsExist {
    async fn account_exists(&self, _address: &Pubkey) -> Result<bool> {
        Ok(true)
    }
}

pub struct FixedRent(pub u64);

#[async_trait]
impl RentSource for FixedRent {
    async fn minimum_balance_for_rent_exemption(&self, _data_len: usize) -> Result<u64> {
        Ok(self.0)
    }
}

pub struct FixedSlot(pub u64);

#[async_trait]
impl SlotSource for FixedSlot {
    async fn current_slot(&self) -> Result<u64> {
        Ok(self.0)
    }
}

/// All fakes wired together around one position.
pub struct Harness {
    pub authority: Pubkey,
    pub position: Pubkey,
    pub clock: Arc<FakeClock>,
    pub sleeper: Arc<RecordingSleeper>,
    pub snapshots: Arc<FakeSnapshots>,
    pub quotes: Arc<FakeQuotes>,
    pub swaps: Arc<FakeSwaps>,
    pub simulator: Arc<FakeSimulator>,
    pub chain: Arc<FakeChain>,
    pub sender: Arc<FakeSender>,
    pub confirmer: Arc<FakeConfirmer>,
    pub blockhashes: Arc<FakeBlockhashes>,
    pub balance: Arc<FakeBalance>,
}

impl Harness {
    pub fn new(snapshot: PositionSnapshot) -> Self {
        let clock = Arc::new(FakeClock::at(NOW_MS));
        let chain = Arc::new(FakeChain::default());
        Self {
            authority: Pubkey::new_unique(),
            position: snapshot.position,
            clock: clock.clone(),
            sleeper: Arc::new(RecordingSleeper::default()),
            snapshots: Arc::new(FakeSnapshots {
                snapshot: Mutex::new(snapshot),
                calls: AtomicU32::new(0),
            }),
            quotes: Arc::new(FakeQuotes {
                clock,
                slippage_bps: 30,
                calls: AtomicU32::new(0),
                requests: Mutex::new(Vec::new()),
            }),
            swaps: Arc::new(FakeSwaps::default()),
            simulator: Arc::new(FakeSimulator::passing()),
            chain: chain.clone(),
            sender: Arc::new(FakeSender {
                chain,
                failures: Mutex::new(VecDeque::new()),
                sent: Mutex::new(Vec::new()),
                corrupt_receipt: Default::default(),
            }),
            confirmer: Arc::new(FakeConfirmer::settling(Confirmation::Confirmed)),
            blockhashes: Arc::new(FakeBlockhashes::default()),
            balance: Arc::new(FakeBalance(AtomicU64::new(5_000_000_000))),
        }
    }

    pub fn connectors(&self) -> Connectors {
        Connectors {
            snapshots: self.snapshots.clone(),
            quotes: self.quotes.clone(),
            swaps: self.swaps.clone(),
            simulator: self.simulator.clone(),
            sender: self.sender.clone(),
            confirmer: self.confirmer.clone(),
            receipts: self.chain.clone(),
            blockhashes: self.blockhashes.clone(),
            balances: self.balance.clone(),
            accounts: Arc::new(AllAccountsExist),
            rent: Arc::new(FixedRent(2_039_280)),
            slots: Arc::new(FixedSlot(1_000)),
            clock: self.clock.clone(),
            sleeper: self.sleeper.clone(),
        }
    }
}
