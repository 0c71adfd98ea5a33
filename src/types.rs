//! Core types and data structures shared by the decision and execution layers.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use solana_sdk::pubkey::Pubkey;

/// Seconds per idempotency epoch.
pub const SECONDS_PER_EPOCH: i64 = 86_400;

/// One observed price reading for the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Slot at which the tick was observed
    pub slot: u64,
    /// Cluster unix time of the observation, in seconds
    pub unix_time_sec: i64,
    /// Current tick index of the pool
    pub current_tick_index: i32,
}

impl Sample {
    pub fn new(slot: u64, unix_time_sec: i64, current_tick_index: i32) -> Self {
        Self {
            slot,
            unix_time_sec,
            current_tick_index,
        }
    }

    /// Ordering key used by canonicalization.
    pub fn sort_key(&self) -> (u64, i64, i32) {
        (self.slot, self.unix_time_sec, self.current_tick_index)
    }
}

/// Loosely typed sample as it arrives from JSON feeds or UI shells.
///
/// Numbers may be fractional, negative or non-finite; [`RawSample::to_sample`]
/// only admits values that are exact integers inside the target ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSample {
    pub slot: f64,
    pub unix_time_sec: f64,
    pub current_tick_index: f64,
}

impl RawSample {
    pub fn to_sample(&self) -> Option<Sample> {
        let slot = exact_integer(self.slot, 0.0, 2f64.powi(64))? as u64;
        let unix = exact_integer(self.unix_time_sec, -(2f64.powi(63)), 2f64.powi(63))? as i64;
        let tick = exact_integer(
            self.current_tick_index,
            f64::from(i32::MIN),
            f64::from(i32::MAX) + 1.0,
        )? as i32;
        Some(Sample::new(slot, unix, tick))
    }
}

/// `min` is inclusive, `max_exclusive` is one past the largest admitted value.
/// `u64::MAX as f64` rounds up to 2^64, so the bound must be exclusive.
fn exact_integer(value: f64, min: f64, max_exclusive: f64) -> Option<f64> {
    if !value.is_finite() || value.fract() != 0.0 || value < min || value >= max_exclusive {
        return None;
    }
    Some(value)
}

/// The position's price range in tick coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub lower_tick_index: i32,
    pub upper_tick_index: i32,
}

impl Bounds {
    pub fn new(lower_tick_index: i32, upper_tick_index: i32) -> Self {
        Self {
            lower_tick_index,
            upper_tick_index,
        }
    }

    pub fn contains(&self, tick: i32) -> bool {
        tick >= self.lower_tick_index && tick <= self.upper_tick_index
    }
}

/// Which side of the range the price left through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitDirection {
    /// Price fell below the lower bound: sell SOL into USDC
    Down,
    /// Price rose above the upper bound: buy SOL with USDC
    Up,
}

impl ExitDirection {
    /// Wire value used by the attestation and the receipt program.
    pub fn code(&self) -> u8 {
        match self {
            ExitDirection::Down => 0,
            ExitDirection::Up => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ExitDirection::Down),
            1 => Some(ExitDirection::Up),
            _ => None,
        }
    }
}

impl fmt::Display for ExitDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitDirection::Down => write!(f, "DOWN"),
            ExitDirection::Up => write!(f, "UP"),
        }
    }
}

/// Solana cluster the agent is pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    #[default]
    Devnet,
    MainnetBeta,
    Localnet,
}

impl Cluster {
    /// Wire value used by the attestation.
    pub fn code(&self) -> u8 {
        match self {
            Cluster::Devnet => 0,
            Cluster::MainnetBeta => 1,
            Cluster::Localnet => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::Devnet => "devnet",
            Cluster::MainnetBeta => "mainnet-beta",
            Cluster::Localnet => "localnet",
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Idempotency epoch (unix day) for a timestamp in seconds.
pub fn epoch_from_unix_sec(unix_time_sec: i64) -> u32 {
    clamp_epoch(unix_time_sec.div_euclid(SECONDS_PER_EPOCH))
}

/// Idempotency epoch (unix day) for a timestamp in milliseconds.
pub fn epoch_from_unix_ms(unix_ms: i64) -> u32 {
    clamp_epoch(unix_ms.div_euclid(SECONDS_PER_EPOCH * 1000))
}

fn clamp_epoch(days: i64) -> u32 {
    days.clamp(0, u32::MAX as i64) as u32
}
