//! Operator configuration for the autopilot.
//!
//! Loaded from a JSON file, validated up front, then handed to the pipeline by
//! value. Nothing in the decision path reads global switches; the execution
//! mode in particular is resolved here.

use crate::decision::attestation::decode_base58_address;
use crate::decision::policy::PolicyConfig;
use crate::decision::swap::SwapRouter;
use crate::errors::DecodeError;
use crate::types::{Cluster, Pubkey};
use anyhow::{Context, Result};
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Receipt program deployed for the autopilot.
pub const DEFAULT_RECEIPT_PROGRAM_ID: &str = "A81Xsuwg5zrT1sgvkncemfWqQ8nymwHS3e7ExM4YnXMm";

/// How the swap leg of an exit is sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Real quotes and real swap instructions
    #[default]
    Live,
    /// Synthetic zero-min-out quote, no swap instructions
    SimulatedQuote,
    /// No quote requested and no swap executed
    SwapDisabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionSettings {
    /// Hard slippage cap applied to every quote
    pub slippage_bps_cap: u16,
    /// Quote age allowed before a rebuild
    pub quote_freshness_ms: u64,
    /// Slot drift allowed before a rebuild
    pub quote_freshness_slots: u64,
    /// Tick drift that forces a rebuild; defaults to the pool tick spacing
    pub rebuild_tick_delta: Option<i32>,
    /// Rebuild attempts the builder may spend on freshness
    pub max_rebuild_attempts: u32,
    pub compute_unit_limit: u32,
    pub compute_unit_price_micro_lamports: u64,
    /// Expected signature fee
    pub tx_fee_lamports: u64,
    /// Lamports that must remain after all projected costs
    pub fee_buffer_lamports: u64,
    /// Dust threshold for DOWN exits (SOL lamports)
    pub min_sol_lamports_to_swap: u64,
    /// Dust threshold for UP exits (USDC minor units)
    pub min_usdc_minor_to_swap: u64,
    pub swap_router: SwapRouter,
    pub mode: ExecutionMode,
    pub receipt_poll_max_attempts: u32,
    pub receipt_poll_interval_ms: u64,
    pub receipt_program_id: String,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            slippage_bps_cap: 50,
            quote_freshness_ms: 20_000,
            quote_freshness_slots: 150,
            rebuild_tick_delta: None,
            max_rebuild_attempts: 3,
            compute_unit_limit: 600_000,
            compute_unit_price_micro_lamports: 10_000,
            tx_fee_lamports: 20_000,
            fee_buffer_lamports: 10_000_000,
            min_sol_lamports_to_swap: 10_000_000,
            min_usdc_minor_to_swap: 1_000_000,
            swap_router: SwapRouter::Orca,
            mode: ExecutionMode::Live,
            receipt_poll_max_attempts: 5,
            receipt_poll_interval_ms: 1_000,
            receipt_program_id: DEFAULT_RECEIPT_PROGRAM_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReliabilitySettings {
    /// Total attempts for retryable reads, sends included
    pub max_attempts: u32,
    /// Sleep before attempt N+1 is entry N; the last entry repeats
    pub retry_backoff_ms: Vec<u64>,
}

impl Default for ReliabilitySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: vec![250, 750, 2_000],
        }
    }
}

impl ReliabilitySettings {
    pub fn backoff_schedule(&self) -> NonEmpty<u64> {
        NonEmpty::from_vec(self.retry_backoff_ms.clone()).unwrap_or_else(|| NonEmpty::new(0))
    }
}

/// Complete autopilot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutopilotConfig {
    pub cluster: Cluster,
    pub policy: PolicyConfig,
    pub execution: ExecutionSettings,
    pub reliability: ReliabilitySettings,
}

/// A single invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub path: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {}", render_issues(.0))]
pub struct ConfigError(pub Vec<ConfigIssue>);

fn render_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{} {}", i.path, i.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl AutopilotConfig {
    /// Load and validate a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AutopilotConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        info!(
            "Loaded autopilot config for {} (mode {:?}, router {:?})",
            config.cluster, config.execution.mode, config.execution.swap_router
        );
        Ok(config)
    }

    /// Check every value and report all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();
        let mut check = |ok: bool, path: &'static str, reason: &str| {
            if !ok {
                issues.push(ConfigIssue {
                    path,
                    reason: reason.to_string(),
                });
            }
        };

        check(self.policy.required_consecutive >= 1, "policy.requiredConsecutive", "must be >= 1");
        check(self.policy.cadence_ms >= 1, "policy.cadenceMs", "must be >= 1");

        let exec = &self.execution;
        check(exec.slippage_bps_cap <= 10_000, "execution.slippageBpsCap", "must be <= 10000");
        check(exec.quote_freshness_ms >= 1, "execution.quoteFreshnessMs", "must be >= 1");
        check(exec.compute_unit_limit >= 1, "execution.computeUnitLimit", "must be >= 1");
        check(
            exec.compute_unit_limit <= 1_400_000,
            "execution.computeUnitLimit",
            "must be <= 1400000",
        );
        check(
            exec.rebuild_tick_delta.map_or(true, |d| d >= 1),
            "execution.rebuildTickDelta",
            "must be >= 1 when set",
        );
        check(
            self.receipt_program_id().is_ok(),
            "execution.receiptProgramId",
            "must be a base58 address",
        );

        let rel = &self.reliability;
        check(rel.max_attempts >= 1, "reliability.maxAttempts", "must be >= 1");
        check(
            !rel.retry_backoff_ms.is_empty(),
            "reliability.retryBackoffMs",
            "must contain at least one entry",
        );
        check(
            rel.retry_backoff_ms.windows(2).all(|w| w[0] <= w[1]),
            "reliability.retryBackoffMs",
            "must be non-decreasing",
        );

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError(issues))
        }
    }

    pub fn receipt_program_id(&self) -> Result<Pubkey, DecodeError> {
        decode_base58_address(&self.execution.receipt_program_id).map(Pubkey::new_from_array)
    }
}
