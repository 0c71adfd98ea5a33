//! Pure decision layer: no I/O, safe to call from any thread.

pub mod attestation;
pub mod mints;
pub mod policy;
pub mod swap;

pub use attestation::{attestation_hash, encode, hash_payload, AddressInput, AttestationInput, ATTESTATION_LEN};
pub use mints::{ensure_sol_usdc_pair, is_sol_usdc_pair, mint_registry, symbol_for_mint, SOL_MINT};
pub use policy::{evaluate, evaluate_raw, Action, Decision, PolicyConfig, PolicyState, ReasonCode};
pub use swap::{decide_swap, SwapPlan, SwapQuote, SwapRouter, SwapSkipReason};
