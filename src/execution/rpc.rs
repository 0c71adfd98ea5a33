//! Read, simulate, confirmation and receipt capabilities over a Solana JSON-RPC node.
//!
//! Client errors are returned with context and left to the reliability layer
//! to classify; nothing here retries.

use crate::errors::ExecutionError;
use crate::execution::ports::{
    AccountLookup, BalanceSource, BlockhashSource, Confirmation, ReceiptFetcher, RentSource, SimulationDiagnostics,
    Simulator, SlotSource, TransactionConfirmer,
};
use crate::execution::receipt::ReceiptAccount;
use crate::types::Pubkey;
use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSimulateTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{TransactionError, VersionedTransaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct RpcConnector {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    receipt_program_id: Pubkey,
}

impl RpcConnector {
    pub fn new(url: impl Into<String>, timeout: Duration, receipt_program_id: Pubkey) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            client: Arc::new(RpcClient::new_with_timeout_and_commitment(url.into(), timeout, commitment)),
            commitment,
            receipt_program_id,
        }
    }

    pub fn from_client(client: Arc<RpcClient>, receipt_program_id: Pubkey) -> Self {
        let commitment = client.commitment();
        Self {
            client,
            commitment,
            receipt_program_id,
        }
    }

    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }
}

/// Accounts are unresolved when the node could not load one the message names.
fn simulation_diagnostics(
    err: Option<TransactionError>,
    logs: Option<Vec<String>>,
    units_consumed: Option<u64>,
) -> SimulationDiagnostics {
    let accounts_resolved = !matches!(
        err,
        Some(TransactionError::AccountNotFound)
            | Some(TransactionError::ProgramAccountNotFound)
            | Some(TransactionError::InvalidAccountForFee)
    );
    SimulationDiagnostics {
        err: err.map(|e| format!("{e:?}: {e}")),
        logs: logs.unwrap_or_default(),
        units_consumed,
        accounts_resolved,
    }
}

#[async_trait]
impl Simulator for RpcConnector {
    #[instrument(skip_all)]
    async fn simulate(&self, transaction: &VersionedTransaction) -> Result<SimulationDiagnostics> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: false,
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(transaction, config)
            .await
            .context("Failed to simulate exit transaction")?;

        let result = response.value;
        let diagnostics = simulation_diagnostics(result.err, result.logs, result.units_consumed);
        if let Some(err) = &diagnostics.err {
            warn!("Simulation reported {}", err);
        } else {
            debug!("Simulation consumed {:?} CU", diagnostics.units_consumed);
        }
        Ok(diagnostics)
    }
}

/// `None` while the signature has not reached the requested commitment.
fn confirmation_from_status(status: Option<Result<(), TransactionError>>) -> Option<Confirmation> {
    match status? {
        Ok(()) => Some(Confirmation::Confirmed),
        Err(e) => Some(Confirmation::Failed(format!("{e:?}: {e}"))),
    }
}

#[async_trait]
impl TransactionConfirmer for RpcConnector {
    #[instrument(skip_all, fields(signature = %signature))]
    async fn confirm(&self, signature: &Signature, blockhash: &Hash) -> Result<Confirmation> {
        loop {
            let status = self
                .client
                .get_signature_status_with_commitment(signature, self.commitment)
                .await
                .with_context(|| format!("Failed to fetch status of {signature}"))?;
            if let Some(confirmation) = confirmation_from_status(status) {
                debug!("Signature settled: {:?}", confirmation);
                return Ok(confirmation);
            }

            let valid = self
                .client
                .is_blockhash_valid(blockhash, self.commitment)
                .await
                .context("Failed to check blockhash validity")?;
            if !valid {
                // one last look, the transaction may have landed on the final valid block
                let status = self
                    .client
                    .get_signature_status_with_commitment(signature, self.commitment)
                    .await
                    .with_context(|| format!("Failed to fetch status of {signature}"))?;
                return Ok(confirmation_from_status(status).unwrap_or(Confirmation::Expired));
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ReceiptFetcher for RpcConnector {
    async fn fetch_receipt(&self, receipt: &Pubkey) -> Result<Option<ReceiptAccount>> {
        let account = self
            .client
            .get_account_with_commitment(receipt, self.commitment)
            .await
            .with_context(|| format!("Failed to fetch receipt {receipt}"))?
            .value;

        let Some(account) = account else {
            return Ok(None);
        };
        if account.owner != self.receipt_program_id {
            warn!("Receipt {} is owned by {}, ignoring", receipt, account.owner);
            return Ok(None);
        }
        let decoded = ReceiptAccount::decode(&account.data).map_err(ExecutionError::from)?;
        Ok(Some(decoded))
    }
}

#[async_trait]
impl BlockhashSource for RpcConnector {
    async fn latest_blockhash(&self) -> Result<Hash> {
        let (blockhash, _last_valid_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .context("Failed to fetch latest blockhash")?;
        Ok(blockhash)
    }
}

#[async_trait]
impl BalanceSource for RpcConnector {
    async fn balance(&self, owner: &Pubkey) -> Result<u64> {
        let balance = self
            .client
            .get_balance_with_commitment(owner, self.commitment)
            .await
            .with_context(|| format!("Failed to fetch balance of {owner}"))?;
        Ok(balance.value)
    }
}

#[async_trait]
impl AccountLookup for RpcConnector {
    async fn account_exists(&self, address: &Pubkey) -> Result<bool> {
        let account = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .with_context(|| format!("Failed to look up account {address}"))?;
        Ok(account.value.is_some())
    }
}

#[async_trait]
impl RentSource for RpcConnector {
    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64> {
        self.client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await
            .context("Failed to fetch rent exemption minimum")
    }
}

#[async_trait]
impl SlotSource for RpcConnector {
    async fn current_slot(&self) -> Result<u64> {
        self.client
            .get_slot_with_commitment(self.commitment)
            .await
            .context("Failed to fetch current slot")
    }
}
