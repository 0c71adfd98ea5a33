//! Canonical error taxonomy surfaced to callers and UI shells.
//!
//! Every failure in the pipeline ends up as an [`ExecutionError`] carrying one
//! of the [`ErrorKind`] codes. The kind fixes whether the reliability layer may
//! retry; nothing below the reliability layer retries on its own.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Canonical failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    DataUnavailable,
    RpcTransient,
    RpcPermanent,
    InvalidPosition,
    DecodeFailed,
    UnsupportedAssetPair,
    AlreadyExecutedThisEpoch,
    QuoteStale,
    SimulationFailed,
    SlippageExceeded,
    InsufficientFeeBuffer,
    BlockhashExpired,
    MissingAttestationHash,
    ReceiptMismatch,
    SwapRouterUnsupportedCluster,
}

impl ErrorKind {
    pub fn all() -> Vec<ErrorKind> {
        vec![
            ErrorKind::DataUnavailable,
            ErrorKind::RpcTransient,
            ErrorKind::RpcPermanent,
            ErrorKind::InvalidPosition,
            ErrorKind::DecodeFailed,
            ErrorKind::UnsupportedAssetPair,
            ErrorKind::AlreadyExecutedThisEpoch,
            ErrorKind::QuoteStale,
            ErrorKind::SimulationFailed,
            ErrorKind::SlippageExceeded,
            ErrorKind::InsufficientFeeBuffer,
            ErrorKind::BlockhashExpired,
            ErrorKind::MissingAttestationHash,
            ErrorKind::ReceiptMismatch,
            ErrorKind::SwapRouterUnsupportedCluster,
        ]
    }

    /// Whether the reliability layer may retry an operation failing with this kind.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RpcTransient | ErrorKind::BlockhashExpired | ErrorKind::QuoteStale
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::DataUnavailable => "DATA_UNAVAILABLE",
            ErrorKind::RpcTransient => "RPC_TRANSIENT",
            ErrorKind::RpcPermanent => "RPC_PERMANENT",
            ErrorKind::InvalidPosition => "INVALID_POSITION",
            ErrorKind::DecodeFailed => "DECODE_FAILED",
            ErrorKind::UnsupportedAssetPair => "UNSUPPORTED_ASSET_PAIR",
            ErrorKind::AlreadyExecutedThisEpoch => "ALREADY_EXECUTED_THIS_EPOCH",
            ErrorKind::QuoteStale => "QUOTE_STALE",
            ErrorKind::SimulationFailed => "SIMULATION_FAILED",
            ErrorKind::SlippageExceeded => "SLIPPAGE_EXCEEDED",
            ErrorKind::InsufficientFeeBuffer => "INSUFFICIENT_FEE_BUFFER",
            ErrorKind::BlockhashExpired => "BLOCKHASH_EXPIRED",
            ErrorKind::MissingAttestationHash => "MISSING_ATTESTATION_HASH",
            ErrorKind::ReceiptMismatch => "RECEIPT_MISMATCH",
            ErrorKind::SwapRouterUnsupportedCluster => "SWAP_ROUTER_UNSUPPORTED_CLUSTER",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::DataUnavailable => "Data unavailable",
            ErrorKind::RpcTransient => "RPC transient",
            ErrorKind::RpcPermanent => "RPC permanent",
            ErrorKind::InvalidPosition => "Invalid position",
            ErrorKind::DecodeFailed => "Decode failed",
            ErrorKind::UnsupportedAssetPair => "Unsupported pair",
            ErrorKind::AlreadyExecutedThisEpoch => "Already executed",
            ErrorKind::QuoteStale => "Quote stale",
            ErrorKind::SimulationFailed => "Simulation failed",
            ErrorKind::SlippageExceeded => "Slippage exceeded",
            ErrorKind::InsufficientFeeBuffer => "Insufficient fee buffer",
            ErrorKind::BlockhashExpired => "Blockhash expired",
            ErrorKind::MissingAttestationHash => "Missing attestation hash",
            ErrorKind::ReceiptMismatch => "Receipt mismatch",
            ErrorKind::SwapRouterUnsupportedCluster => "Swap router unsupported",
        }
    }

    /// Default user-facing message for the kind.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::DataUnavailable => "Required data could not be loaded.",
            ErrorKind::RpcTransient => "Temporary RPC issue. Retry shortly.",
            ErrorKind::RpcPermanent => "RPC error is not retryable.",
            ErrorKind::InvalidPosition => "Position account is invalid or missing.",
            ErrorKind::DecodeFailed => "Unable to decode required account or address data.",
            ErrorKind::UnsupportedAssetPair => "Position must be SOL/USDC.",
            ErrorKind::AlreadyExecutedThisEpoch => "Execution already recorded for this epoch.",
            ErrorKind::QuoteStale => "Quote is stale and could not be refreshed safely.",
            ErrorKind::SimulationFailed => "Simulation failed; execution blocked.",
            ErrorKind::SlippageExceeded => "Quote exceeds configured slippage cap.",
            ErrorKind::InsufficientFeeBuffer => "Insufficient lamports after fee buffer reserve.",
            ErrorKind::BlockhashExpired => "Refresh and rebuild transaction.",
            ErrorKind::MissingAttestationHash => "Execution attestation hash is missing or invalid.",
            ErrorKind::ReceiptMismatch => "On-chain receipt does not match the local attestation.",
            ErrorKind::SwapRouterUnsupportedCluster => "Configured swap router does not support this cluster.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified pipeline failure.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub message: String,
    pub debug: Option<Value>,
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

impl ExecutionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: Value) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Render the `(code, title, message, debug)` tuple shown by UI shells.
    pub fn to_ui(&self) -> UiError {
        let debug = self
            .debug
            .as_ref()
            .map(|d| serde_json::to_string_pretty(d).unwrap_or_else(|_| d.to_string()));

        let message = match (self.kind, self.debug.as_ref()) {
            (ErrorKind::InsufficientFeeBuffer, Some(d)) => {
                fee_buffer_message(d).unwrap_or_else(|| self.kind.message().to_string())
            }
            _ => self.kind.message().to_string(),
        };

        UiError {
            code: self.kind,
            title: self.kind.title().to_string(),
            message,
            debug: debug.or_else(|| Some(self.message.clone())),
        }
    }
}

fn fee_buffer_message(debug: &Value) -> Option<String> {
    let req = debug.get("requirements");
    let field = |v: Option<&Value>, key: &str| v.and_then(|v| v.get(key)).and_then(Value::as_u64);

    let parts: Vec<String> = [
        ("available", field(Some(debug), "availableLamports")),
        ("required", field(req, "totalRequiredLamports")),
        ("deficit", field(Some(debug), "deficitLamports")),
        ("projectedCost", field(Some(debug), "projectedCostLamports")),
        ("missingATAs", field(req, "ataCount")),
        ("rent", field(req, "rentLamports")),
        ("txFee", field(req, "txFeeLamports")),
        ("priority", field(req, "priorityFeeLamports")),
        ("buffer", field(req, "bufferLamports")),
    ]
    .into_iter()
    .filter_map(|(label, v)| v.map(|v| format!("{label}={v}")))
    .collect();

    if parts.is_empty() {
        return None;
    }
    Some(format!("Not enough SOL for fees/buffer ({}).", parts.join(", ")))
}

/// User-visible failure tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiError {
    pub code: ErrorKind,
    pub title: String,
    pub message: String,
    pub debug: Option<String>,
}

/// Address decoding failures raised by the pure codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid base58 address: {0}")]
    InvalidBase58(String),

    #[error("address must decode to exactly 32 bytes, got {0}")]
    WrongLength(usize),

    #[error("account data too short: need {needed} bytes, got {actual}")]
    AccountTooShort { needed: usize, actual: usize },
}

impl From<DecodeError> for ExecutionError {
    fn from(err: DecodeError) -> Self {
        ExecutionError::new(ErrorKind::DecodeFailed, err.to_string())
    }
}

const TRANSIENT_HINTS: [&str; 6] = [
    "timeout",
    "timed out",
    "429",
    "rate limit",
    "temporarily unavailable",
    "econnreset",
];

/// Classify a free-text failure into the canonical taxonomy.
///
/// Unrecognised failures become `RpcPermanent` so that unknown errors are never
/// retried in a loop.
pub fn normalize_error(err: &dyn fmt::Display) -> ExecutionError {
    let message = err.to_string();
    let lower = message.to_lowercase();

    let kind = if lower.contains("blockhash not found")
        || lower.contains("blockhash expired")
        || lower.contains("transaction was not confirmed")
    {
        ErrorKind::BlockhashExpired
    } else if lower.contains("simulation failed") {
        ErrorKind::SimulationFailed
    } else if lower.contains("slippage") {
        ErrorKind::SlippageExceeded
    } else if TRANSIENT_HINTS.iter().any(|h| lower.contains(h)) {
        ErrorKind::RpcTransient
    } else {
        ErrorKind::RpcPermanent
    };

    ExecutionError::new(kind, message)
}

impl From<anyhow::Error> for ExecutionError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ExecutionError>() {
            Ok(classified) => classified,
            Err(other) => normalize_error(&format!("{other:#}")),
        }
    }
}
