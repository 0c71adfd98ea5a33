//! Rebuild triggers, the bounded retry loop and blockhash refresh.
//!
//! This is the only place in the crate that retries anything.

use crate::config::ReliabilitySettings;
use crate::errors::{ErrorKind, ExecutionError, ExecutionResult};
use crate::execution::ports::{BlockhashSource, PositionSnapshot, Sleeper};
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use solana_sdk::hash::Hash;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a cached quote was built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuoteProvenance {
    pub quoted_at_unix_ms: i64,
    pub quoted_at_slot: Option<u64>,
    pub quote_tick_index: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildThresholds {
    pub now_unix_ms: i64,
    pub latest_slot: Option<u64>,
    pub quote_freshness_ms: u64,
    pub quote_freshness_slots: u64,
    /// Falls back to the pool tick spacing
    pub rebuild_tick_delta: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebuildReason {
    QuoteStale,
    BoundCrossed,
    TickMoved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildCheck {
    pub rebuild: bool,
    pub reason: Option<RebuildReason>,
}

impl RebuildCheck {
    fn keep() -> Self {
        Self { rebuild: false, reason: None }
    }

    fn because(reason: RebuildReason) -> Self {
        Self {
            rebuild: true,
            reason: Some(reason),
        }
    }
}

/// Staleness first, then bound crossing, then tick drift.
pub fn should_rebuild(
    quote: &QuoteProvenance,
    snapshot: &PositionSnapshot,
    thresholds: &RebuildThresholds,
) -> RebuildCheck {
    let age_ms = thresholds.now_unix_ms.saturating_sub(quote.quoted_at_unix_ms);
    let stale_by_time = age_ms > 0 && age_ms as u64 > thresholds.quote_freshness_ms;
    let stale_by_slot = match (quote.quoted_at_slot, thresholds.latest_slot) {
        (Some(quoted), Some(latest)) => latest.saturating_sub(quoted) > thresholds.quote_freshness_slots,
        _ => false,
    };
    if stale_by_time || stale_by_slot {
        return RebuildCheck::because(RebuildReason::QuoteStale);
    }

    if !snapshot.in_range() {
        return RebuildCheck::because(RebuildReason::BoundCrossed);
    }

    if let Some(quote_tick) = quote.quote_tick_index {
        let moved = (i64::from(snapshot.current_tick_index) - i64::from(quote_tick)).abs();
        let delta = thresholds
            .rebuild_tick_delta
            .unwrap_or(i32::from(snapshot.tick_spacing));
        if moved >= i64::from(delta) {
            return RebuildCheck::because(RebuildReason::TickMoved);
        }
    }

    RebuildCheck::keep()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: NonEmpty<u64>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: NonEmpty<u64>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_ms,
        }
    }

    /// Sleep after failed attempt `attempt` (1-based); the schedule's last
    /// entry repeats once it runs out.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        let ms = self.backoff_ms.get(index).copied().unwrap_or(*self.backoff_ms.last());
        Duration::from_millis(ms)
    }
}

impl From<&ReliabilitySettings> for RetryPolicy {
    fn from(settings: &ReliabilitySettings) -> Self {
        RetryPolicy::new(settings.max_attempts, settings.backoff_schedule())
    }
}

/// Run `op` until it succeeds, fails non-retryably, or runs out of attempts.
pub async fn with_bounded_retry<T, E, F, Fut>(
    mut op: F,
    sleeper: &dyn Sleeper,
    policy: &RetryPolicy,
) -> ExecutionResult<T>
where
    E: Into<ExecutionError>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 1;
    loop {
        let err: ExecutionError = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e.into(),
        };

        if !err.retryable() || attempt >= policy.max_attempts {
            debug!("Giving up after attempt {}: {}", attempt, err);
            return Err(err);
        }

        let backoff = policy.backoff_after(attempt);
        warn!(
            "Attempt {}/{} failed with {}; retrying in {} ms",
            attempt,
            policy.max_attempts,
            err.code(),
            backoff.as_millis()
        );
        sleeper.sleep(backoff).await;
        attempt += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashState {
    pub blockhash: Hash,
    pub fetched_at_unix_ms: i64,
}

#[derive(Debug)]
pub enum BlockhashRefresh<R> {
    /// Still fresh; keep the current message
    Current,
    Rebuilt { state: BlockhashState, output: R },
}

impl<R> BlockhashRefresh<R> {
    pub fn rebuilt(&self) -> bool {
        matches!(self, BlockhashRefresh::Rebuilt { .. })
    }
}

/// Fetch a new blockhash and rebuild the message when the current one is older
/// than the freshness window or the last send failed on blockhash expiry.
pub async fn refresh_blockhash_if_needed<R, F, Fut>(
    current: &BlockhashState,
    now_unix_ms: i64,
    freshness_ms: u64,
    send_error: Option<&ExecutionError>,
    source: &dyn BlockhashSource,
    rebuild_message: F,
) -> ExecutionResult<BlockhashRefresh<R>>
where
    F: FnOnce(Hash) -> Fut,
    Fut: Future<Output = ExecutionResult<R>>,
{
    let delay_ms = now_unix_ms.saturating_sub(current.fetched_at_unix_ms);
    let aged_out = delay_ms > 0 && delay_ms as u64 > freshness_ms;
    let expired = send_error.is_some_and(|e| e.kind == ErrorKind::BlockhashExpired);

    if !aged_out && !expired {
        return Ok(BlockhashRefresh::Current);
    }

    let blockhash = source.latest_blockhash().await.map_err(ExecutionError::from)?;
    info!(
        "Refreshing blockhash (aged out: {}, expired on send: {})",
        aged_out, expired
    );
    let output = rebuild_message(blockhash).await?;
    Ok(BlockhashRefresh::Rebuilt {
        state: BlockhashState {
            blockhash,
            fetched_at_unix_ms: now_unix_ms,
        },
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cluster, Pubkey};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper(Mutex<Vec<u64>>);

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration.as_millis() as u64);
        }
    }

    struct FixedBlockhash(Hash);

    #[async_trait]
    impl BlockhashSource for FixedBlockhash {
        async fn latest_blockhash(&self) -> anyhow::Result<Hash> {
            Ok(self.0)
        }
    }

    fn snapshot(current: i32) -> PositionSnapshot {
        PositionSnapshot {
            cluster: Cluster::Devnet,
            whirlpool: Pubkey::new_unique(),
            position: Pubkey::new_unique(),
            position_mint: Pubkey::new_unique(),
            current_tick_index: current,
            lower_tick_index: 100,
            upper_tick_index: 200,
            tick_spacing: 8,
            liquidity: 1,
            token_mint_a: Pubkey::new_unique(),
            token_mint_b: Pubkey::new_unique(),
            token_vault_a: Pubkey::new_unique(),
            token_vault_b: Pubkey::new_unique(),
            token_program_a: Pubkey::new_unique(),
            token_program_b: Pubkey::new_unique(),
            tick_array_lower: Pubkey::new_unique(),
            tick_array_upper: Pubkey::new_unique(),
            remove_preview: None,
            observed_slot: 0,
        }
    }

    fn thresholds(now: i64, slot: Option<u64>) -> RebuildThresholds {
        RebuildThresholds {
            now_unix_ms: now,
            latest_slot: slot,
            quote_freshness_ms: 1_000,
            quote_freshness_slots: 10,
            rebuild_tick_delta: None,
        }
    }

    #[test]
    fn test_rebuild_priority_order() {
        let quote = QuoteProvenance {
            quoted_at_unix_ms: 0,
            quoted_at_slot: Some(0),
            quote_tick_index: Some(150),
        };

        // stale and out of range at once: staleness wins
        let check = should_rebuild(&quote, &snapshot(50), &thresholds(5_000, None));
        assert_eq!(check.reason, Some(RebuildReason::QuoteStale));

        let check = should_rebuild(&quote, &snapshot(150), &thresholds(500, Some(11)));
        assert_eq!(check.reason, Some(RebuildReason::QuoteStale));

        let check = should_rebuild(&quote, &snapshot(250), &thresholds(500, Some(5)));
        assert_eq!(check.reason, Some(RebuildReason::BoundCrossed));

        let check = should_rebuild(&quote, &snapshot(158), &thresholds(500, Some(5)));
        assert_eq!(check.reason, Some(RebuildReason::TickMoved));

        let check = should_rebuild(&quote, &snapshot(157), &thresholds(500, Some(5)));
        assert!(!check.rebuild);
    }

    #[test]
    fn test_explicit_tick_delta() {
        let quote = QuoteProvenance {
            quoted_at_unix_ms: 0,
            quoted_at_slot: None,
            quote_tick_index: Some(150),
        };
        let mut t = thresholds(0, None);
        t.rebuild_tick_delta = Some(2);
        assert_eq!(
            should_rebuild(&quote, &snapshot(148), &t).reason,
            Some(RebuildReason::TickMoved)
        );
    }

    #[test]
    fn test_backoff_clamps_to_last_entry() {
        let policy = RetryPolicy::new(5, NonEmpty::from_vec(vec![10, 20]).unwrap());
        assert_eq!(policy.backoff_after(1), Duration::from_millis(10));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(20));
        assert_eq!(policy.backoff_after(4), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_retry_transient_until_success() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::new(3, NonEmpty::from_vec(vec![250, 750]).unwrap());
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let value = with_bounded_retry(
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(anyhow!("429 Too Many Requests"))
                } else {
                    Ok(7)
                }
            },
            &sleeper,
            &policy,
        )
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*sleeper.0.lock().unwrap(), vec![250, 750]);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::new(5, NonEmpty::new(100));
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let err = with_bounded_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ExecutionError::new(ErrorKind::SlippageExceeded, "cap"))
            },
            &sleeper,
            &policy,
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::SlippageExceeded);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_last_error() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::new(2, NonEmpty::new(5));

        let err = with_bounded_retry(
            || async { Err::<(), _>(anyhow!("request timed out")) },
            &sleeper,
            &policy,
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::RpcTransient);
        assert_eq!(sleeper.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blockhash_refresh_triggers() {
        let fresh = Hash::new_unique();
        let source = FixedBlockhash(fresh);
        let current = BlockhashState {
            blockhash: Hash::default(),
            fetched_at_unix_ms: 1_000,
        };

        let kept = refresh_blockhash_if_needed(&current, 1_500, 1_000, None, &source, |_| async { Ok(()) })
            .await
            .unwrap();
        assert!(!kept.rebuilt());

        let aged = refresh_blockhash_if_needed(&current, 5_000, 1_000, None, &source, |h| async move { Ok(h) })
            .await
            .unwrap();
        match aged {
            BlockhashRefresh::Rebuilt { state, output } => {
                assert_eq!(state.blockhash, fresh);
                assert_eq!(output, fresh);
                assert_eq!(state.fetched_at_unix_ms, 5_000);
            }
            BlockhashRefresh::Current => panic!("expected a rebuild"),
        }

        let send_err = ExecutionError::new(ErrorKind::BlockhashExpired, "Blockhash not found");
        let expired = refresh_blockhash_if_needed(&current, 1_100, 1_000, Some(&send_err), &source, |_| async {
            Ok(())
        })
        .await
        .unwrap();
        assert!(expired.rebuilt());
    }
}
