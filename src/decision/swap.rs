//! Swap leg planning: router identity, dust decision and the quote shape
//! committed to by the attestation.

use crate::config::ExecutionSettings;
use crate::errors::{ErrorKind, ExecutionError, ExecutionResult};
use crate::types::{Cluster, ExitDirection, Pubkey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapRouter {
    Jupiter,
    Orca,
    Noop,
}

impl SwapRouter {
    pub fn code(&self) -> u8 {
        match self {
            SwapRouter::Jupiter => 0,
            SwapRouter::Orca => 1,
            SwapRouter::Noop => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwapRouter::Jupiter => "jupiter",
            SwapRouter::Orca => "orca",
            SwapRouter::Noop => "noop",
        }
    }

    pub fn supports_cluster(&self, cluster: Cluster) -> bool {
        match self {
            SwapRouter::Jupiter => cluster == Cluster::MainnetBeta,
            SwapRouter::Orca => matches!(cluster, Cluster::Devnet | Cluster::MainnetBeta),
            SwapRouter::Noop => true,
        }
    }
}

impl fmt::Display for SwapRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn ensure_router_supports_cluster(router: SwapRouter, cluster: Cluster) -> ExecutionResult<()> {
    if router.supports_cluster(cluster) {
        return Ok(());
    }
    Err(ExecutionError::new(
        ErrorKind::SwapRouterUnsupportedCluster,
        format!("Swap router {router} does not support cluster {cluster}"),
    )
    .with_debug(json!({ "swapRouter": router.as_str(), "cluster": cluster.as_str() })))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapSkipReason {
    #[default]
    None,
    Dust,
    RouterDisabled,
}

impl SwapSkipReason {
    pub fn code(&self) -> u8 {
        match self {
            SwapSkipReason::None => 0,
            SwapSkipReason::Dust => 1,
            SwapSkipReason::RouterDisabled => 2,
        }
    }
}

/// A router quote for the exit swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuote {
    pub router: SwapRouter,
    pub in_mint: Pubkey,
    pub out_mint: Pubkey,
    pub swap_in_amount: u64,
    pub swap_min_out_amount: u64,
    pub slippage_bps: u16,
    pub quoted_at_unix_ms: i64,
    /// Router-specific diagnostics, never part of the attestation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

impl SwapQuote {
    pub fn quoted_at_unix_sec(&self) -> i64 {
        self.quoted_at_unix_ms.div_euclid(1000)
    }

    /// Placeholder quote for exits that plan no swap.
    pub fn empty(router: SwapRouter, in_mint: Pubkey, out_mint: Pubkey, slippage_bps: u16) -> Self {
        Self {
            router,
            in_mint,
            out_mint,
            swap_in_amount: 0,
            swap_min_out_amount: 0,
            slippage_bps,
            quoted_at_unix_ms: 0,
            debug: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapPlan {
    pub swap_planned: bool,
    pub swap_skip_reason: SwapSkipReason,
    pub swap_router: SwapRouter,
    pub quote: SwapQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapDecision {
    pub execute: bool,
    pub skip_reason: SwapSkipReason,
}

/// Skip the swap when the freed exposure is below the dust threshold for the
/// asset being sold: SOL lamports for DOWN, USDC minor units for UP.
pub fn decide_swap(exposure: u64, direction: ExitDirection, settings: &ExecutionSettings) -> SwapDecision {
    let threshold = match direction {
        ExitDirection::Down => settings.min_sol_lamports_to_swap,
        ExitDirection::Up => settings.min_usdc_minor_to_swap,
    };
    if exposure < threshold {
        SwapDecision {
            execute: false,
            skip_reason: SwapSkipReason::Dust,
        }
    } else {
        SwapDecision {
            execute: true,
            skip_reason: SwapSkipReason::None,
        }
    }
}
