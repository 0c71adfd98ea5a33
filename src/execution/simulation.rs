//! Simulation gate and best-effort classification of simulation failures.

use crate::errors::{ErrorKind, ExecutionError, ExecutionResult};
use crate::execution::ports::SimulationDiagnostics;
use serde_json::json;

/// Ordered log heuristics; the first match wins.
const PATTERNS: &[(ErrorKind, &[&str], &str)] = &[
    (
        ErrorKind::SlippageExceeded,
        &["slippage", "min out"],
        "Simulation failed due to slippage/minOut constraints",
    ),
    (
        ErrorKind::InsufficientFeeBuffer,
        &["insufficient funds", "insufficient lamports"],
        "Simulation failed due to insufficient funds",
    ),
    (
        ErrorKind::DataUnavailable,
        &["account not found", "could not find account"],
        "Simulation failed due to missing account/ATA",
    ),
    (
        ErrorKind::InvalidPosition,
        &["invalid account owner", "owner does not match", "constraint"],
        "Simulation failed due to invalid account owner/constraint",
    ),
    (
        ErrorKind::AlreadyExecutedThisEpoch,
        &["already executed", "receipt already exists"],
        "Simulation failed because receipt already exists for epoch",
    ),
];

fn diagnostics_text(sim: &SimulationDiagnostics) -> String {
    let mut text = sim.err.clone().unwrap_or_default();
    for line in &sim.logs {
        text.push('\n');
        text.push_str(line);
    }
    text.to_lowercase()
}

/// Map a failed simulation to a canonical, non-retryable error.
pub fn classify_simulation_failure(sim: &SimulationDiagnostics) -> ExecutionError {
    let text = diagnostics_text(sim);

    let matched = PATTERNS
        .iter()
        .find(|(kind, needles, _)| {
            needles.iter().any(|n| text.contains(n))
                || (*kind == ErrorKind::DataUnavailable && text.contains("ata") && text.contains("missing"))
        })
        .map(|(kind, _, message)| (*kind, *message));

    let (kind, message) = match matched {
        Some(found) => found,
        None if sim.err.is_none() && !sim.accounts_resolved => (
            ErrorKind::DataUnavailable,
            "Simulation could not resolve every referenced account",
        ),
        None => (ErrorKind::SimulationFailed, "Simulation failed"),
    };

    ExecutionError::new(kind, message).with_debug(json!({
        "err": sim.err,
        "logs": sim.logs,
        "unitsConsumed": sim.units_consumed,
        "accountsResolved": sim.accounts_resolved,
    }))
}

pub fn ensure_simulation_ok(sim: &SimulationDiagnostics) -> ExecutionResult<()> {
    if sim.err.is_none() && sim.accounts_resolved {
        return Ok(());
    }
    Err(classify_simulation_failure(sim))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(err: &str, logs: &[&str]) -> SimulationDiagnostics {
        SimulationDiagnostics {
            err: Some(err.to_string()),
            logs: logs.iter().map(|l| l.to_string()).collect(),
            units_consumed: Some(1_000),
            accounts_resolved: true,
        }
    }

    #[test]
    fn test_success_passes() {
        assert!(ensure_simulation_ok(&SimulationDiagnostics::success(5_000)).is_ok());
    }

    #[test]
    fn test_classification_order() {
        let cases = [
            (failed("custom", &["Program log: Slippage tolerance exceeded"]), ErrorKind::SlippageExceeded),
            (failed("InsufficientFundsForRent", &["insufficient lamports 10, need 20"]), ErrorKind::InsufficientFeeBuffer),
            (failed("AccountNotFound", &["account not found"]), ErrorKind::DataUnavailable),
            (failed("custom", &["the ata is missing"]), ErrorKind::DataUnavailable),
            (failed("custom", &["AnchorError: A raw constraint was violated"]), ErrorKind::InvalidPosition),
            (failed("custom", &["receipt already exists"]), ErrorKind::AlreadyExecutedThisEpoch),
            (failed("custom", &["something novel"]), ErrorKind::SimulationFailed),
        ];
        for (sim, expected) in cases {
            let err = ensure_simulation_ok(&sim).unwrap_err();
            assert_eq!(err.kind, expected, "logs: {:?}", sim.logs);
            assert!(!err.retryable());
        }
    }

    #[test]
    fn test_slippage_wins_over_funds() {
        let sim = failed("x", &["insufficient funds", "min out not met"]);
        assert_eq!(classify_simulation_failure(&sim).kind, ErrorKind::SlippageExceeded);
    }

    #[test]
    fn test_unresolved_accounts_block_send() {
        let sim = SimulationDiagnostics {
            err: None,
            logs: vec![],
            units_consumed: None,
            accounts_resolved: false,
        };
        let err = ensure_simulation_ok(&sim).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DataUnavailable);
    }
}
