//! Canonical SOL/USDC mint registry per cluster.

use crate::errors::{ErrorKind, ExecutionError, ExecutionResult};
use crate::types::{Cluster, ExitDirection, Pubkey};
use serde_json::json;
use std::fmt;

pub const SOL_MINT: Pubkey = solana_sdk::pubkey!("So11111111111111111111111111111111111111112");
pub const USDC_DEVNET_MINT: Pubkey = solana_sdk::pubkey!("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU");
pub const USDC_MAINNET_MINT: Pubkey = solana_sdk::pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintRegistry {
    pub sol: Pubkey,
    pub usdc: Pubkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintSymbol {
    Sol,
    Usdc,
    Unknown,
}

impl fmt::Display for MintSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MintSymbol::Sol => write!(f, "SOL"),
            MintSymbol::Usdc => write!(f, "USDC"),
            MintSymbol::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Localnet forks devnet state, so it shares the devnet USDC mint.
pub fn mint_registry(cluster: Cluster) -> MintRegistry {
    let usdc = match cluster {
        Cluster::MainnetBeta => USDC_MAINNET_MINT,
        Cluster::Devnet | Cluster::Localnet => USDC_DEVNET_MINT,
    };
    MintRegistry { sol: SOL_MINT, usdc }
}

pub fn is_sol_usdc_pair(mint_a: &Pubkey, mint_b: &Pubkey, cluster: Cluster) -> bool {
    let MintRegistry { sol, usdc } = mint_registry(cluster);
    (*mint_a == sol && *mint_b == usdc) || (*mint_a == usdc && *mint_b == sol)
}

pub fn ensure_sol_usdc_pair(mint_a: &Pubkey, mint_b: &Pubkey, cluster: Cluster) -> ExecutionResult<()> {
    if is_sol_usdc_pair(mint_a, mint_b, cluster) {
        return Ok(());
    }
    Err(ExecutionError::new(
        ErrorKind::UnsupportedAssetPair,
        format!("Unsupported pair for {cluster}: {mint_a}/{mint_b}"),
    )
    .with_debug(json!({
        "pair": pair_label(mint_a, mint_b, cluster),
        "mintA": mint_a.to_string(),
        "mintB": mint_b.to_string(),
        "cluster": cluster.as_str(),
    })))
}

pub fn symbol_for_mint(mint: &Pubkey, cluster: Cluster) -> MintSymbol {
    let registry = mint_registry(cluster);
    if *mint == registry.sol {
        MintSymbol::Sol
    } else if *mint == registry.usdc {
        MintSymbol::Usdc
    } else {
        MintSymbol::Unknown
    }
}

/// `(input, output)` mints of the exit swap: DOWN sells SOL, UP buys it back.
pub fn direction_mints(direction: ExitDirection, cluster: Cluster) -> (Pubkey, Pubkey) {
    let MintRegistry { sol, usdc } = mint_registry(cluster);
    match direction {
        ExitDirection::Down => (sol, usdc),
        ExitDirection::Up => (usdc, sol),
    }
}

/// Human label such as `SOL/USDC` for a pool's mint pair.
pub fn pair_label(mint_a: &Pubkey, mint_b: &Pubkey, cluster: Cluster) -> String {
    format!("{}/{}", symbol_for_mint(mint_a, cluster), symbol_for_mint(mint_b, cluster))
}
