//! Slot-keyed memo of derived tick-array addresses.
//!
//! Owned by the orchestrator and mutated through `&mut self`, so a single
//! writer is enforced by the borrow checker. Every entry belongs to the slot it
//! was derived at; observing a different slot drops them all.

use crate::execution::whirlpool::{swap_tick_array_starts, tick_array_address};
use crate::types::Pubkey;
use moka::future::Cache;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

pub struct TickArrayCache {
    entries: Cache<(Pubkey, i32), Pubkey>,
    observed_slot: Option<u64>,
    stats: CacheStats,
}

impl TickArrayCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_capacity).build(),
            observed_slot: None,
            stats: CacheStats::default(),
        }
    }

    pub fn observed_slot(&self) -> Option<u64> {
        self.observed_slot
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Drop every entry and forget the observed slot.
    pub fn invalidate(&mut self) {
        self.entries.invalidate_all();
        self.observed_slot = None;
        self.stats.invalidations += 1;
    }

    fn observe_slot(&mut self, slot: u64) {
        if self.observed_slot == Some(slot) {
            return;
        }
        if let Some(previous) = self.observed_slot {
            debug!("Tick array cache invalidated: slot {} -> {}", previous, slot);
            self.entries.invalidate_all();
            self.stats.invalidations += 1;
        }
        self.observed_slot = Some(slot);
    }

    pub async fn tick_array(&mut self, slot: u64, whirlpool: &Pubkey, start_tick_index: i32) -> Pubkey {
        self.observe_slot(slot);
        let key = (*whirlpool, start_tick_index);
        if let Some(address) = self.entries.get(&key).await {
            self.stats.hits += 1;
            return address;
        }
        self.stats.misses += 1;
        let address = tick_array_address(whirlpool, start_tick_index);
        self.entries.insert(key, address).await;
        address
    }

    /// Tick arrays a swap starting at `tick_current_index` traverses.
    pub async fn swap_tick_arrays(
        &mut self,
        slot: u64,
        whirlpool: &Pubkey,
        tick_current_index: i32,
        tick_spacing: u16,
        a_to_b: bool,
    ) -> Vec<Pubkey> {
        let mut out = Vec::new();
        for start in swap_tick_array_starts(tick_current_index, tick_spacing, a_to_b) {
            out.push(self.tick_array(slot, whirlpool, start).await);
        }
        out
    }
}

impl Default for TickArrayCache {
    fn default() -> Self {
        Self::new(1_024)
    }
}
