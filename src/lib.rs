//! clmm-autopilot - range-exit autopilot for concentrated-liquidity positions
//!
//! Watches a Whirlpool position, decides when price has left the range for
//! long enough, and exits it in one simulated, attested transaction whose
//! execution is recorded by an idempotent on-chain receipt.

pub mod config;
pub mod decision;
pub mod errors;
pub mod execution;
pub mod types;

// Re-export main types for convenience
pub use config::{AutopilotConfig, ExecutionMode, ExecutionSettings, ReliabilitySettings};
pub use errors::{ErrorKind, ExecutionError, ExecutionResult, UiError};
pub use execution::{ExecuteOutcome, Orchestrator};
pub use types::{Bounds, Cluster, ExitDirection, RawSample, Sample};
