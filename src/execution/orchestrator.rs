//! One evaluation cycle for one position.
//!
//! `refresh_position_decision` runs the range-break policy against a fresh
//! snapshot. `execute_once` additionally, on a trigger, plans the swap leg,
//! commits to it with an attestation, builds and simulates the exit, sends it
//! and verifies the receipt the program wrote.
//!
//! The orchestrator owns the policy state and the tick-array cache. Callers
//! must not run two `execute_once` calls for the same position concurrently;
//! the receipt only protects against a duplicate commit, not against a
//! duplicate fee spend.

use crate::config::{AutopilotConfig, ExecutionMode};
use crate::decision::attestation::{encode, hash_payload, AttestationInput, ATTESTATION_LEN};
use crate::decision::mints::{direction_mints, ensure_sol_usdc_pair};
use crate::decision::policy::{evaluate, Action, Decision, PolicyState};
use crate::decision::swap::{
    decide_swap, ensure_router_supports_cluster, SwapPlan, SwapQuote, SwapRouter, SwapSkipReason,
};
use crate::errors::{ErrorKind, ExecutionError, ExecutionResult};
use crate::execution::builder::{build_exit_transaction, BuildExitConfig, BuiltExit, ExitQuote};
use crate::execution::ports::{
    AccountLookup, BalanceSource, BlockhashSource, Clock, Confirmation, ExitRebuilder, PositionSnapshot,
    QuoteRequest, QuoteSource, ReceiptFetcher, RentSource, SimulationDiagnostics, Simulator, Sleeper, SlotSource,
    SnapshotSource, SwapContext, SwapInstructionSource, SwapInstructions, TransactionConfirmer, TransactionSender,
};
use crate::execution::receipt::{derive_receipt_address, verify_receipt, ExpectedReceipt, ReceiptAccount};
use crate::execution::reliability::{
    refresh_blockhash_if_needed, should_rebuild, with_bounded_retry, BlockhashRefresh, BlockhashState,
    QuoteProvenance, RebuildReason, RebuildThresholds, RetryPolicy,
};
use crate::execution::requirements::{compute_execution_requirements, FeeRequirements, RequirementsInput};
use crate::execution::tick_cache::{CacheStats, TickArrayCache};
use crate::types::{epoch_from_unix_ms, ExitDirection, Pubkey, Sample};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// External collaborators, one per concern.
#[derive(Clone)]
pub struct Connectors {
    pub snapshots: Arc<dyn SnapshotSource>,
    pub quotes: Arc<dyn QuoteSource>,
    pub swaps: Arc<dyn SwapInstructionSource>,
    pub simulator: Arc<dyn Simulator>,
    pub sender: Arc<dyn TransactionSender>,
    pub confirmer: Arc<dyn TransactionConfirmer>,
    pub receipts: Arc<dyn ReceiptFetcher>,
    pub blockhashes: Arc<dyn BlockhashSource>,
    pub balances: Arc<dyn BalanceSource>,
    pub accounts: Arc<dyn AccountLookup>,
    pub rent: Arc<dyn RentSource>,
    pub slots: Arc<dyn SlotSource>,
    pub clock: Arc<dyn Clock>,
    pub sleeper: Arc<dyn Sleeper>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDecision {
    pub snapshot: PositionSnapshot,
    pub decision: Decision,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub decision: Decision,
    pub direction: ExitDirection,
    pub epoch: u32,
    pub signature: Signature,
    pub blockhash: Hash,
    pub receipt_address: Pubkey,
    pub attestation_hash: [u8; 32],
    pub swap_plan: SwapPlan,
    pub requirements: FeeRequirements,
    pub simulation: SimulationDiagnostics,
    /// Why the first plan was replaced, if it was
    pub rebuild_reason: Option<RebuildReason>,
    pub receipt: Option<ReceiptAccount>,
    /// False when the receipt did not become visible while polling
    pub receipt_verified: bool,
}

#[derive(Debug, Clone)]
pub enum ExecuteOutcome {
    Hold(PositionDecision),
    Executed(Box<ExecutionReport>),
}

impl ExecuteOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, ExecuteOutcome::Executed(_))
    }
}

#[derive(Debug, Clone)]
struct PlannedExit {
    plan: SwapPlan,
    swap_instructions: SwapInstructions,
    quote_tick_index: i32,
}

/// A plan with its attestation and funding checks, ready to build.
#[derive(Debug, Clone)]
struct PreparedExit {
    snapshot: PositionSnapshot,
    direction: ExitDirection,
    epoch: u32,
    planned: PlannedExit,
    attestation_payload: [u8; ATTESTATION_LEN],
    attestation_hash: [u8; 32],
    available_lamports: u64,
    requirements: FeeRequirements,
}

pub struct Orchestrator {
    config: AutopilotConfig,
    authority: Pubkey,
    connectors: Connectors,
    retry: RetryPolicy,
    policy_state: Mutex<PolicyState>,
    tick_arrays: Mutex<TickArrayCache>,
}

/// Lamports freed on the side being sold, from the removal preview.
fn swap_exposure(snapshot: &PositionSnapshot, input_mint: &Pubkey) -> ExecutionResult<u64> {
    let preview = snapshot.remove_preview.ok_or_else(|| {
        ExecutionError::new(ErrorKind::DataUnavailable, "Remove preview unavailable")
            .with_debug(json!({ "position": snapshot.position.to_string() }))
    })?;
    if *input_mint == snapshot.token_mint_a {
        Ok(preview.token_a_out)
    } else if *input_mint == snapshot.token_mint_b {
        Ok(preview.token_b_out)
    } else {
        Err(ExecutionError::new(
            ErrorKind::UnsupportedAssetPair,
            format!("Swap input mint {input_mint} is not a mint of the position's pool"),
        ))
    }
}

fn direction_for(action: Action) -> Option<ExitDirection> {
    match action {
        Action::Hold => None,
        Action::TriggerDown => Some(ExitDirection::Down),
        Action::TriggerUp => Some(ExitDirection::Up),
    }
}

impl Orchestrator {
    pub fn new(config: AutopilotConfig, authority: Pubkey, connectors: Connectors) -> Self {
        let retry = RetryPolicy::from(&config.reliability);
        Self {
            config,
            authority,
            connectors,
            retry,
            policy_state: Mutex::new(PolicyState::default()),
            tick_arrays: Mutex::new(TickArrayCache::default()),
        }
    }

    /// Resume from a persisted policy state.
    pub fn with_policy_state(self, state: PolicyState) -> Self {
        Self {
            policy_state: Mutex::new(state),
            ..self
        }
    }

    pub fn config(&self) -> &AutopilotConfig {
        &self.config
    }

    pub async fn policy_state(&self) -> PolicyState {
        *self.policy_state.lock().await
    }

    pub async fn tick_cache_stats(&self) -> CacheStats {
        self.tick_arrays.lock().await.stats()
    }

    async fn retry<T, E, F, Fut>(&self, op: F) -> ExecutionResult<T>
    where
        E: Into<ExecutionError>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        with_bounded_retry(op, self.connectors.sleeper.as_ref(), &self.retry).await
    }

    async fn fetch_snapshot(&self, position: &Pubkey) -> ExecutionResult<PositionSnapshot> {
        let snapshots = &self.connectors.snapshots;
        self.retry(move || snapshots.fetch_snapshot(position)).await
    }

    /// Evaluate the range-break policy against a fresh snapshot and keep the
    /// resulting state for the next cycle.
    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    pub async fn refresh_position_decision(
        &self,
        position: &Pubkey,
        samples: &[Sample],
    ) -> ExecutionResult<PositionDecision> {
        let snapshot = self.fetch_snapshot(position).await?;

        let mut state = self.policy_state.lock().await;
        let decision = evaluate(samples, &snapshot.bounds(), &self.config.policy, *state);
        *state = decision.next_state;

        debug!(
            "Policy decision {:?} ({:?}) at tick {} in [{}, {}]",
            decision.action,
            decision.reason_code,
            snapshot.current_tick_index,
            snapshot.lower_tick_index,
            snapshot.upper_tick_index
        );
        Ok(PositionDecision { snapshot, decision })
    }

    /// Run one full cycle; sends at most one exit transaction.
    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    pub async fn execute_once(&self, position: &Pubkey, samples: &[Sample]) -> ExecutionResult<ExecuteOutcome> {
        let refreshed = self.refresh_position_decision(position, samples).await?;
        let Some(direction) = direction_for(refreshed.decision.action) else {
            return Ok(ExecuteOutcome::Hold(refreshed));
        };
        info!(
            "Range break {} triggered for position {} ({:?})",
            direction, position, refreshed.decision.reason_code
        );

        let mut snapshot = self.fetch_snapshot(position).await?;
        ensure_sol_usdc_pair(&snapshot.token_mint_a, &snapshot.token_mint_b, snapshot.cluster)?;

        let epoch = epoch_from_unix_ms(self.connectors.clock.now_unix_ms());
        let receipt_program_id = self.config.receipt_program_id()?;
        let (receipt_address, _) =
            derive_receipt_address(&receipt_program_id, &self.authority, &snapshot.position_mint, epoch);
        self.ensure_no_receipt(&receipt_address, epoch).await?;

        let slots = &self.connectors.slots;
        let latest_slot = self.retry(move || slots.current_slot()).await?;

        let mut planned = self.plan_exit(&snapshot, direction).await?;
        let check = should_rebuild(
            &QuoteProvenance {
                quoted_at_unix_ms: planned.plan.quote.quoted_at_unix_ms,
                quoted_at_slot: Some(latest_slot),
                quote_tick_index: Some(planned.quote_tick_index),
            },
            &snapshot,
            &self.rebuild_thresholds(latest_slot),
        );
        if check.rebuild {
            info!("Rebuilding exit plan ({:?})", check.reason);
            snapshot = self.fetch_snapshot(position).await?;
            planned = self.plan_exit(&snapshot, direction).await?;
        }

        let mut prepared = self.prepare(snapshot, direction, epoch, planned).await?;

        let blockhashes = &self.connectors.blockhashes;
        let mut blockhash = BlockhashState {
            fetched_at_unix_ms: self.connectors.clock.now_unix_ms(),
            blockhash: self.retry(move || blockhashes.latest_blockhash()).await?,
        };

        let mut built = self.build(&prepared, blockhash.blockhash).await?;
        if built.rebuild_attempts > 0 {
            // The attestation must describe the quote that is actually sent.
            info!("Builder refreshed a stale quote; re-planning against the new snapshot");
            let planned = self.plan_exit(&built.snapshot, direction).await?;
            prepared = self.prepare(built.snapshot.clone(), direction, epoch, planned).await?;
            built = self.build_committed(&prepared, blockhash.blockhash).await?;
        }

        let freshness_ms = self.config.execution.quote_freshness_ms;
        let refresh = refresh_blockhash_if_needed(
            &blockhash,
            self.connectors.clock.now_unix_ms(),
            freshness_ms,
            None,
            self.connectors.blockhashes.as_ref(),
            |hash| self.build_committed(&prepared, hash),
        )
        .await?;
        if let BlockhashRefresh::Rebuilt { state, output } = refresh {
            blockhash = state;
            built = output;
        }

        let signature = match self.connectors.sender.sign_and_send(&built.transaction).await {
            Ok(signature) => signature,
            Err(e) => {
                let err = ExecutionError::from(e);
                if err.kind != ErrorKind::BlockhashExpired {
                    return Err(err);
                }
                warn!("Send failed on blockhash expiry; rebuilding and re-sending once");
                let refresh = refresh_blockhash_if_needed(
                    &blockhash,
                    self.connectors.clock.now_unix_ms(),
                    freshness_ms,
                    Some(&err),
                    self.connectors.blockhashes.as_ref(),
                    |hash| self.build_committed(&prepared, hash),
                )
                .await?;
                let BlockhashRefresh::Rebuilt { state, output } = refresh else {
                    return Err(err);
                };
                blockhash = state;
                built = output;
                self.connectors
                    .sender
                    .sign_and_send(&built.transaction)
                    .await
                    .map_err(ExecutionError::from)?
            }
        };
        info!("Exit transaction sent: {}", signature);
        self.confirm_sent(&signature, &blockhash.blockhash).await?;

        let receipt = self.poll_receipt(&receipt_address).await?;
        let expected = ExpectedReceipt {
            authority: self.authority,
            position_mint: prepared.snapshot.position_mint,
            epoch,
            direction,
            attestation_hash: prepared.attestation_hash,
        };
        let receipt_verified = match &receipt {
            Some(found) => {
                verify_receipt(found, &expected)?;
                info!("Receipt {} verified", receipt_address);
                true
            }
            None => {
                warn!("Receipt {} not visible after polling; left unverified", receipt_address);
                false
            }
        };

        Ok(ExecuteOutcome::Executed(Box::new(ExecutionReport {
            decision: refreshed.decision,
            direction,
            epoch,
            signature,
            blockhash: blockhash.blockhash,
            receipt_address,
            attestation_hash: prepared.attestation_hash,
            swap_plan: prepared.planned.plan,
            requirements: prepared.requirements,
            simulation: built.simulation,
            rebuild_reason: check.reason,
            receipt,
            receipt_verified,
        })))
    }

    fn rebuild_thresholds(&self, latest_slot: u64) -> RebuildThresholds {
        let settings = &self.config.execution;
        RebuildThresholds {
            now_unix_ms: self.connectors.clock.now_unix_ms(),
            latest_slot: Some(latest_slot),
            quote_freshness_ms: settings.quote_freshness_ms,
            quote_freshness_slots: settings.quote_freshness_slots,
            rebuild_tick_delta: settings.rebuild_tick_delta,
        }
    }

    async fn ensure_no_receipt(&self, receipt_address: &Pubkey, epoch: u32) -> ExecutionResult<()> {
        let receipts = &self.connectors.receipts;
        let existing = self.retry(move || receipts.fetch_receipt(receipt_address)).await?;
        match existing {
            None => Ok(()),
            Some(receipt) => Err(ExecutionError::new(
                ErrorKind::AlreadyExecutedThisEpoch,
                "Execution receipt already exists for canonical epoch",
            )
            .with_debug(json!({
                "receipt": receipt_address.to_string(),
                "epoch": epoch,
                "fields": receipt.summary(),
            }))),
        }
    }

    /// Wait for the sent transaction to confirm. Nothing is re-sent here: an
    /// expiry surfaces as `BlockhashExpired` for the caller's next cycle.
    async fn confirm_sent(&self, signature: &Signature, blockhash: &Hash) -> ExecutionResult<()> {
        let confirmer = &self.connectors.confirmer;
        match self.retry(move || confirmer.confirm(signature, blockhash)).await? {
            Confirmation::Confirmed => {
                debug!("Exit transaction {} confirmed", signature);
                Ok(())
            }
            Confirmation::Failed(reason) => Err(ExecutionError::new(
                ErrorKind::RpcPermanent,
                "Exit transaction failed on-chain",
            )
            .with_debug(json!({
                "signature": signature.to_string(),
                "err": reason,
            }))),
            Confirmation::Expired => Err(ExecutionError::new(
                ErrorKind::BlockhashExpired,
                "Blockhash expired before the exit transaction confirmed",
            )
            .with_debug(json!({
                "signature": signature.to_string(),
                "blockhash": blockhash.to_string(),
            }))),
        }
    }

    async fn poll_receipt(&self, receipt_address: &Pubkey) -> ExecutionResult<Option<ReceiptAccount>> {
        let settings = &self.config.execution;
        let receipts = &self.connectors.receipts;
        for attempt in 1..=settings.receipt_poll_max_attempts {
            if let Some(receipt) = self.retry(move || receipts.fetch_receipt(receipt_address)).await? {
                return Ok(Some(receipt));
            }
            if attempt < settings.receipt_poll_max_attempts {
                self.connectors
                    .sleeper
                    .sleep(Duration::from_millis(settings.receipt_poll_interval_ms))
                    .await;
            }
        }
        Ok(None)
    }

    /// Decide the swap leg for an exit in `direction`. Plans without a swap
    /// carry a zero-amount quote over the direction's mints, stamped now.
    async fn plan_exit(&self, snapshot: &PositionSnapshot, direction: ExitDirection) -> ExecutionResult<PlannedExit> {
        let settings = &self.config.execution;
        let router = settings.swap_router;
        let now = self.connectors.clock.now_unix_ms();
        let (in_mint, out_mint) = direction_mints(direction, snapshot.cluster);

        let skipped = |reason: SwapSkipReason, swap_in_amount: u64| PlannedExit {
            plan: SwapPlan {
                swap_planned: false,
                swap_skip_reason: reason,
                swap_router: router,
                quote: SwapQuote {
                    swap_in_amount,
                    quoted_at_unix_ms: now,
                    ..SwapQuote::empty(router, in_mint, out_mint, settings.slippage_bps_cap)
                },
            },
            swap_instructions: SwapInstructions::default(),
            quote_tick_index: snapshot.current_tick_index,
        };

        if settings.mode == ExecutionMode::SwapDisabled {
            return Ok(skipped(SwapSkipReason::RouterDisabled, 0));
        }

        let exposure = swap_exposure(snapshot, &in_mint)?;
        if settings.mode == ExecutionMode::SimulatedQuote {
            debug!("Simulated quote for {} units of {}", exposure, in_mint);
            return Ok(skipped(SwapSkipReason::RouterDisabled, exposure));
        }
        if !decide_swap(exposure, direction, settings).execute {
            debug!("Exposure {} below dust threshold; skipping swap", exposure);
            return Ok(skipped(SwapSkipReason::Dust, 0));
        }
        if router == SwapRouter::Noop {
            return Ok(skipped(SwapSkipReason::RouterDisabled, 0));
        }
        ensure_router_supports_cluster(router, snapshot.cluster)?;

        let a_to_b = in_mint == snapshot.token_mint_a;
        let tick_arrays = self
            .tick_arrays
            .lock()
            .await
            .swap_tick_arrays(
                snapshot.observed_slot,
                &snapshot.whirlpool,
                snapshot.current_tick_index,
                snapshot.tick_spacing,
                a_to_b,
            )
            .await;

        let request = QuoteRequest {
            cluster: snapshot.cluster,
            in_mint,
            out_mint,
            swap_in_amount: exposure,
            slippage_bps_cap: settings.slippage_bps_cap,
            context: SwapContext {
                whirlpool: snapshot.whirlpool,
                tick_spacing: snapshot.tick_spacing,
                tick_current_index: snapshot.current_tick_index,
                tick_arrays,
                token_mint_a: snapshot.token_mint_a,
                token_mint_b: snapshot.token_mint_b,
                token_vault_a: snapshot.token_vault_a,
                token_vault_b: snapshot.token_vault_b,
                token_program_a: snapshot.token_program_a,
                token_program_b: snapshot.token_program_b,
                a_to_b,
            },
        };

        let quotes = &self.connectors.quotes;
        let req = &request;
        let quote = self.retry(move || quotes.quote(req)).await?;

        let swaps = &self.connectors.swaps;
        let (authority, quoted) = (&self.authority, &quote);
        let swap_instructions = self
            .retry(move || swaps.swap_instructions(quoted, authority, &req.context))
            .await?;

        info!(
            "Planned {} swap of {} {} for at least {} {}",
            router, quote.swap_in_amount, quote.in_mint, quote.swap_min_out_amount, quote.out_mint
        );
        Ok(PlannedExit {
            plan: SwapPlan {
                swap_planned: true,
                swap_skip_reason: SwapSkipReason::None,
                swap_router: router,
                quote,
            },
            swap_instructions,
            quote_tick_index: snapshot.current_tick_index,
        })
    }

    fn attestation_input(
        &self,
        snapshot: &PositionSnapshot,
        direction: ExitDirection,
        epoch: u32,
        plan: &SwapPlan,
    ) -> AttestationInput {
        AttestationInput {
            cluster: snapshot.cluster,
            authority: self.authority.into(),
            position: snapshot.position.into(),
            position_mint: snapshot.position_mint.into(),
            pool: snapshot.whirlpool.into(),
            epoch,
            direction,
            current_tick_index: snapshot.current_tick_index,
            lower_tick_index: snapshot.lower_tick_index,
            upper_tick_index: snapshot.upper_tick_index,
            slippage_bps_cap: self.config.execution.slippage_bps_cap,
            quote_input_mint: plan.quote.in_mint.into(),
            quote_output_mint: plan.quote.out_mint.into(),
            quote_in_amount: plan.quote.swap_in_amount,
            quote_min_out_amount: plan.quote.swap_min_out_amount,
            quote_quoted_at_unix_sec: plan.quote.quoted_at_unix_sec(),
            swap_planned: plan.swap_planned,
            swap_skip_reason: plan.swap_skip_reason,
            swap_router: plan.swap_router,
        }
    }

    async fn prepare(
        &self,
        snapshot: PositionSnapshot,
        direction: ExitDirection,
        epoch: u32,
        planned: PlannedExit,
    ) -> ExecutionResult<PreparedExit> {
        let settings = &self.config.execution;
        let input = self.attestation_input(&snapshot, direction, epoch, &planned.plan);
        let attestation_payload = encode(&input)?;
        let attestation_hash = hash_payload(&attestation_payload);
        debug!("Attestation {}", hex::encode(attestation_hash));

        let balances = &self.connectors.balances;
        let authority = &self.authority;
        let available_lamports = self.retry(move || balances.balance(authority)).await?;

        let requirements_input = RequirementsInput {
            snapshot: &snapshot,
            input_mint: planned.plan.quote.in_mint,
            output_mint: planned.plan.quote.out_mint,
            authority: self.authority,
            tx_fee_lamports: settings.tx_fee_lamports,
            compute_unit_limit: settings.compute_unit_limit,
            compute_unit_price_micro_lamports: settings.compute_unit_price_micro_lamports,
            buffer_lamports: settings.fee_buffer_lamports,
        };
        let (accounts, rent, input_ref) = (
            self.connectors.accounts.as_ref(),
            self.connectors.rent.as_ref(),
            &requirements_input,
        );
        let requirements = self
            .retry(move || compute_execution_requirements(input_ref, accounts, rent))
            .await?;

        Ok(PreparedExit {
            snapshot,
            direction,
            epoch,
            planned,
            attestation_payload,
            attestation_hash,
            available_lamports,
            requirements,
        })
    }

    async fn build(&self, prepared: &PreparedExit, recent_blockhash: Hash) -> ExecutionResult<BuiltExit> {
        let settings = &self.config.execution;
        let replanner = Replanner {
            orchestrator: self,
            position: prepared.snapshot.position,
            direction: prepared.direction,
        };
        let config = BuildExitConfig {
            authority: self.authority,
            payer: self.authority,
            recent_blockhash,
            compute_unit_limit: settings.compute_unit_limit,
            compute_unit_price_micro_lamports: settings.compute_unit_price_micro_lamports,
            quote: ExitQuote::from(&prepared.planned.plan.quote),
            slippage_bps_cap: settings.slippage_bps_cap,
            quote_freshness_ms: settings.quote_freshness_ms,
            max_rebuild_attempts: settings.max_rebuild_attempts,
            swap_plan: prepared.planned.plan.clone(),
            swap_instructions: prepared.planned.swap_instructions.clone(),
            receipt_program_id: self.config.receipt_program_id()?,
            receipt_epoch: prepared.epoch,
            available_lamports: prepared.available_lamports,
            requirements: prepared.requirements,
            attestation_hash: prepared.attestation_hash.to_vec(),
            attestation_payload: Some(prepared.attestation_payload.to_vec()),
            clock: self.connectors.clock.as_ref(),
            rebuilder: &replanner,
            simulator: self.connectors.simulator.as_ref(),
        };
        build_exit_transaction(&prepared.snapshot, prepared.direction, &config).await
    }

    /// Build without letting the quote drift away from the attestation.
    async fn build_committed(&self, prepared: &PreparedExit, recent_blockhash: Hash) -> ExecutionResult<BuiltExit> {
        let built = self.build(prepared, recent_blockhash).await?;
        if built.rebuild_attempts > 0 {
            return Err(ExecutionError::new(
                ErrorKind::QuoteStale,
                "Quote went stale after the attestation was committed",
            )
            .with_debug(json!({ "rebuildAttempts": built.rebuild_attempts })));
        }
        Ok(built)
    }
}

/// Rebuild callback handed to the builder: re-read the position and re-plan.
struct Replanner<'a> {
    orchestrator: &'a Orchestrator,
    position: Pubkey,
    direction: ExitDirection,
}

#[async_trait]
impl<'a> ExitRebuilder for Replanner<'a> {
    async fn rebuild(&self) -> anyhow::Result<(PositionSnapshot, ExitQuote)> {
        let snapshot = self.orchestrator.fetch_snapshot(&self.position).await?;
        let planned = self.orchestrator.plan_exit(&snapshot, self.direction).await?;
        Ok((snapshot, ExitQuote::from(&planned.plan.quote)))
    }
}
