//! Exit transaction builder.
//!
//! Each safety gate is a function returning `ExecutionResult`; the builder
//! chains them with `?`, so the first failure aborts the build and nothing
//! partially assembled escapes. The only suspension points are the rebuild
//! callback inside the freshness loop and the final simulation.

use crate::decision::attestation::{digests_equal, hash_payload};
use crate::decision::mints::{direction_mints, ensure_sol_usdc_pair, SOL_MINT};
use crate::decision::swap::{SwapPlan, SwapQuote};
use crate::errors::{ErrorKind, ExecutionError, ExecutionResult};
use crate::execution::ata::create_ata_idempotent;
use crate::execution::ports::{Clock, ExitRebuilder, PositionSnapshot, SimulationDiagnostics, Simulator, SwapInstructions};
use crate::execution::receipt::record_execution_ix;
use crate::execution::requirements::FeeRequirements;
use crate::execution::simulation::ensure_simulation_ok;
use crate::execution::whirlpool::build_exit_instructions;
use crate::execution::wsol::{involves_sol, wsol_lifecycle};
use crate::types::{ExitDirection, Pubkey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{v0, VersionedMessage};
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use tracing::{debug, info, instrument, warn};

/// Upper bound on time spent refreshing a stale quote, from loop entry.
pub const FRESHNESS_REBUILD_WINDOW_MS: i64 = 15_000;

/// The quote the builder gates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitQuote {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    pub min_out_amount: u64,
    pub slippage_bps: u16,
    pub quoted_at_unix_ms: i64,
}

impl From<&SwapQuote> for ExitQuote {
    fn from(quote: &SwapQuote) -> Self {
        Self {
            input_mint: quote.in_mint,
            output_mint: quote.out_mint,
            in_amount: quote.swap_in_amount,
            min_out_amount: quote.swap_min_out_amount,
            slippage_bps: quote.slippage_bps,
            quoted_at_unix_ms: quote.quoted_at_unix_ms,
        }
    }
}

/// Everything one build needs; borrowed collaborators live for the call.
pub struct BuildExitConfig<'a> {
    pub authority: Pubkey,
    pub payer: Pubkey,
    pub recent_blockhash: Hash,
    pub compute_unit_limit: u32,
    pub compute_unit_price_micro_lamports: u64,

    pub quote: ExitQuote,
    pub slippage_bps_cap: u16,
    pub quote_freshness_ms: u64,
    pub max_rebuild_attempts: u32,

    pub swap_plan: SwapPlan,
    pub swap_instructions: SwapInstructions,

    pub receipt_program_id: Pubkey,
    pub receipt_epoch: u32,

    pub available_lamports: u64,
    pub requirements: FeeRequirements,

    pub attestation_hash: Vec<u8>,
    /// When present, the hash must be its SHA-256
    pub attestation_payload: Option<Vec<u8>>,

    pub clock: &'a dyn Clock,
    pub rebuilder: &'a dyn ExitRebuilder,
    pub simulator: &'a dyn Simulator,
}

#[derive(Debug, Clone)]
pub struct BuiltExit {
    /// Compiled v0 transaction with placeholder signatures
    pub transaction: VersionedTransaction,
    pub instructions: Vec<Instruction>,
    /// Snapshot and quote the transaction was built from, after any rebuilds
    pub snapshot: PositionSnapshot,
    pub quote: ExitQuote,
    pub rebuild_attempts: u32,
    pub simulation: SimulationDiagnostics,
}

fn gate_failed(err: ExecutionError) -> ExecutionError {
    warn!("Exit build blocked: {} ({})", err.code(), err.message);
    err
}

fn ensure_attestation_hash(hash: &[u8], payload: Option<&[u8]>) -> ExecutionResult<[u8; 32]> {
    let fail = |message: &str| ExecutionError::new(ErrorKind::MissingAttestationHash, message);

    let hash: [u8; 32] = hash
        .try_into()
        .map_err(|_| fail("attestation hash must be exactly 32 bytes"))?;
    if hash.iter().all(|b| *b == 0) {
        return Err(fail("attestation hash must be non-zero"));
    }
    if let Some(payload) = payload {
        if payload.is_empty() {
            return Err(fail("attestation payload is empty"));
        }
        if !digests_equal(&hash_payload(payload), &hash) {
            return Err(fail("attestation hash must equal sha256(payload)"));
        }
    }
    Ok(hash)
}

fn ensure_slippage_within_cap(quote: &ExitQuote, cap_bps: u16) -> ExecutionResult<()> {
    if quote.slippage_bps <= cap_bps {
        return Ok(());
    }
    Err(ExecutionError::new(
        ErrorKind::SlippageExceeded,
        format!("Quote slippage {} bps exceeds cap {} bps", quote.slippage_bps, cap_bps),
    )
    .with_debug(json!({ "slippageBps": quote.slippage_bps, "slippageBpsCap": cap_bps })))
}

fn quote_age_ms(quote: &ExitQuote, now_unix_ms: i64) -> i64 {
    now_unix_ms.saturating_sub(quote.quoted_at_unix_ms)
}

fn is_stale(quote: &ExitQuote, now_unix_ms: i64, freshness_ms: u64) -> bool {
    let age = quote_age_ms(quote, now_unix_ms);
    age > 0 && age as u64 > freshness_ms
}

fn ensure_direction_mints(
    snapshot: &PositionSnapshot,
    quote: &ExitQuote,
    direction: ExitDirection,
) -> ExecutionResult<()> {
    ensure_sol_usdc_pair(&snapshot.token_mint_a, &snapshot.token_mint_b, snapshot.cluster)?;

    let (expected_in, expected_out) = direction_mints(direction, snapshot.cluster);
    if quote.input_mint == expected_in && quote.output_mint == expected_out {
        return Ok(());
    }
    Err(ExecutionError::new(
        ErrorKind::UnsupportedAssetPair,
        format!("Quote mints do not match a {direction} exit"),
    )
    .with_debug(json!({
        "direction": direction.to_string(),
        "expectedInputMint": expected_in.to_string(),
        "expectedOutputMint": expected_out.to_string(),
        "inputMint": quote.input_mint.to_string(),
        "outputMint": quote.output_mint.to_string(),
    })))
}

/// `available - projected < buffer` fails, which is `available < total`.
fn ensure_fee_buffer(available_lamports: u64, requirements: &FeeRequirements) -> ExecutionResult<()> {
    let required = requirements.total_required_lamports;
    if available_lamports >= required {
        return Ok(());
    }
    Err(ExecutionError::new(
        ErrorKind::InsufficientFeeBuffer,
        "Insufficient lamports for projected execution costs + fee buffer",
    )
    .with_debug(json!({
        "availableLamports": available_lamports,
        "deficitLamports": required - available_lamports,
        "projectedCostLamports": requirements.projected_cost_lamports(),
        "requirements": requirements,
        "notes": [
            "requirements.totalRequiredLamports = rentLamports + txFeeLamports + priorityFeeLamports + bufferLamports",
            "rentLamports = missing ATA count * token account rent exemption",
        ],
    })))
}

fn ensure_swap_instructions(plan: &SwapPlan, swap: &SwapInstructions) -> ExecutionResult<()> {
    if !plan.swap_planned || !swap.instructions.is_empty() {
        return Ok(());
    }
    Err(ExecutionError::new(
        ErrorKind::DataUnavailable,
        "Swap is planned but the router returned no swap instructions",
    )
    .with_debug(json!({
        "swapRouter": plan.swap_router.as_str(),
        "swapSkipReason": plan.swap_skip_reason,
        "quote": {
            "inMint": plan.quote.in_mint.to_string(),
            "outMint": plan.quote.out_mint.to_string(),
            "swapInAmount": plan.quote.swap_in_amount.to_string(),
            "swapMinOutAmount": plan.quote.swap_min_out_amount.to_string(),
        },
    })))
}

/// Fixed order: compute budget, token accounts, wrap, remove, collect, swap,
/// unwrap, receipt.
fn assemble_instructions(
    snapshot: &PositionSnapshot,
    direction: ExitDirection,
    config: &BuildExitConfig<'_>,
    attestation_hash: &[u8; 32],
) -> ExecutionResult<Vec<Instruction>> {
    let plan = &config.swap_plan;
    let swap_planned = plan.swap_planned;
    let exit = build_exit_instructions(snapshot, &config.authority, &config.payer);

    let mut instructions = vec![
        ComputeBudgetInstruction::set_compute_unit_limit(config.compute_unit_limit),
        ComputeBudgetInstruction::set_compute_unit_price(config.compute_unit_price_micro_lamports),
    ];
    instructions.extend(exit.conditional_ata_ixs);

    let quote_in = plan.quote.in_mint;
    let quote_out = plan.quote.out_mint;
    if swap_planned {
        let covered = [snapshot.position_mint, snapshot.token_mint_a, snapshot.token_mint_b];
        for mint in [quote_in, quote_out] {
            if mint != SOL_MINT && !covered.contains(&mint) {
                let program = snapshot.token_program_for(&mint);
                instructions.push(create_ata_idempotent(&config.payer, &config.authority, &mint, &program).1);
            }
        }
    }

    let wsol = if swap_planned && involves_sol(&quote_in, &quote_out) {
        let wrap = (quote_in == SOL_MINT).then_some(plan.quote.swap_in_amount);
        wsol_lifecycle(&config.authority, &config.payer, &quote_in, &quote_out, wrap)?
    } else {
        Default::default()
    };

    instructions.extend(wsol.pre_swap);
    instructions.push(exit.remove_liquidity_ix);
    instructions.push(exit.collect_fees_ix);
    if swap_planned {
        instructions.extend(config.swap_instructions.instructions.iter().cloned());
    }
    instructions.extend(wsol.post_swap);
    instructions.push(record_execution_ix(
        &config.receipt_program_id,
        &config.authority,
        &snapshot.position_mint,
        config.receipt_epoch,
        direction,
        attestation_hash,
    ));

    Ok(instructions)
}

fn compile_transaction(
    payer: &Pubkey,
    instructions: &[Instruction],
    swap: &SwapInstructions,
    recent_blockhash: Hash,
) -> ExecutionResult<VersionedTransaction> {
    let message = v0::Message::try_compile(payer, instructions, &swap.lookup_tables, recent_blockhash)
        .map_err(|e| ExecutionError::new(ErrorKind::DataUnavailable, format!("Failed to compile v0 message: {e}")))?;
    let signers = usize::from(message.header.num_required_signatures);
    Ok(VersionedTransaction {
        signatures: vec![Signature::default(); signers],
        message: VersionedMessage::V0(message),
    })
}

/// Build and simulate the exit transaction. Never sends.
#[instrument(skip_all, fields(position = %snapshot.position, direction = %direction))]
pub async fn build_exit_transaction(
    snapshot: &PositionSnapshot,
    direction: ExitDirection,
    config: &BuildExitConfig<'_>,
) -> ExecutionResult<BuiltExit> {
    let attestation_hash =
        ensure_attestation_hash(&config.attestation_hash, config.attestation_payload.as_deref())
            .map_err(gate_failed)?;

    // Pair first, then the cap; an over-cap quote is not staleness and must
    // never reach the rebuild loop.
    ensure_direction_mints(snapshot, &config.quote, direction).map_err(gate_failed)?;
    ensure_slippage_within_cap(&config.quote, config.slippage_bps_cap).map_err(gate_failed)?;

    let mut snapshot = snapshot.clone();
    let mut quote = config.quote.clone();
    let mut rebuild_attempts: u32 = 0;
    let loop_started_ms = config.clock.now_unix_ms();

    while is_stale(&quote, config.clock.now_unix_ms(), config.quote_freshness_ms) {
        let now = config.clock.now_unix_ms();
        let elapsed_ms = now.saturating_sub(loop_started_ms);
        if rebuild_attempts >= config.max_rebuild_attempts || elapsed_ms > FRESHNESS_REBUILD_WINDOW_MS {
            return Err(gate_failed(
                ExecutionError::new(ErrorKind::QuoteStale, "Quote is stale and could not be refreshed in time")
                    .with_debug(json!({
                        "quoteAgeMs": quote_age_ms(&quote, now),
                        "quoteFreshnessMs": config.quote_freshness_ms,
                        "rebuildAttempts": rebuild_attempts,
                        "elapsedMs": elapsed_ms,
                    })),
            ));
        }

        rebuild_attempts += 1;
        debug!("Quote stale, rebuilding (attempt {})", rebuild_attempts);
        let (fresh_snapshot, fresh_quote) = config.rebuilder.rebuild().await.map_err(ExecutionError::from)?;
        snapshot = fresh_snapshot;
        quote = fresh_quote;
    }

    if rebuild_attempts > 0 {
        ensure_direction_mints(&snapshot, &quote, direction).map_err(gate_failed)?;
        ensure_slippage_within_cap(&quote, config.slippage_bps_cap).map_err(gate_failed)?;
    }
    ensure_fee_buffer(config.available_lamports, &config.requirements).map_err(gate_failed)?;
    ensure_swap_instructions(&config.swap_plan, &config.swap_instructions).map_err(gate_failed)?;

    let instructions = assemble_instructions(&snapshot, direction, config, &attestation_hash)?;
    let transaction = compile_transaction(
        &config.payer,
        &instructions,
        &config.swap_instructions,
        config.recent_blockhash,
    )?;

    let simulation = config
        .simulator
        .simulate(&transaction)
        .await
        .map_err(ExecutionError::from)?;
    ensure_simulation_ok(&simulation).map_err(gate_failed)?;

    info!(
        "Exit transaction built: {} instructions, {} rebuilds, {} CU simulated",
        instructions.len(),
        rebuild_attempts,
        simulation.units_consumed.unwrap_or_default()
    );

    Ok(BuiltExit {
        transaction,
        instructions,
        snapshot,
        quote,
        rebuild_attempts,
        simulation,
    })
}
