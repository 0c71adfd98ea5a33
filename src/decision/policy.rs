//! Range-break policy: debounced, cooled-down trigger decision.
//!
//! [`evaluate`] is a pure function of its inputs. Samples are canonicalized
//! (sorted by `(slot, unix_time_sec, current_tick_index)` and deduplicated)
//! before anything else, so the order in which a caller presents them never
//! changes the result.

use crate::types::{Bounds, RawSample, Sample};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Operator thresholds for the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyConfig {
    /// Consecutive out-of-range samples on one side needed to trigger
    pub required_consecutive: u32,
    /// Largest gap between consecutive samples that keeps a run alive
    pub cadence_ms: u32,
    /// Minimum time between two triggers
    pub cooldown_ms: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            required_consecutive: 3,
            cadence_ms: 2_000,
            cooldown_ms: 90_000,
        }
    }
}

/// State carried from one evaluation cycle to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyState {
    pub last_trigger_unix_time_sec: Option<i64>,
    pub last_evaluated_sample: Option<Sample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Hold,
    TriggerDown,
    TriggerUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    DataUnavailable,
    InRange,
    DebounceNotMet,
    CooldownActive,
    DuplicateEvaluation,
    NonMonotonicSample,
    TriggerDownConsecutive,
    TriggerUpConsecutive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionDebug {
    pub samples_used: usize,
    /// `required_consecutive * cadence_ms`
    pub threshold: u64,
    pub cooldown_remaining_ms: u64,
}

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub action: Action,
    pub reason_code: ReasonCode,
    pub debug: DecisionDebug,
    pub next_state: PolicyState,
}

impl Decision {
    pub fn is_trigger(&self) -> bool {
        self.action != Action::Hold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Down,
    Up,
    InRange,
}

fn classify(sample: &Sample, bounds: &Bounds) -> Side {
    if sample.current_tick_index < bounds.lower_tick_index {
        Side::Down
    } else if sample.current_tick_index > bounds.upper_tick_index {
        Side::Up
    } else {
        Side::InRange
    }
}

/// Sort and deduplicate samples.
pub fn canonicalize(samples: &[Sample]) -> Vec<Sample> {
    let mut canonical = samples.to_vec();
    canonical.sort_by_key(Sample::sort_key);
    canonical.dedup();
    canonical
}

/// Length of the run of `side` samples ending at the latest sample, broken by
/// any gap wider than `cadence_ms`.
fn trailing_run(canonical: &[Sample], sides: &[Side], side: Side, cadence_ms: u32) -> u32 {
    let mut run = 0u32;
    for i in (0..sides.len()).rev() {
        if sides[i] != side {
            break;
        }
        if i + 1 < sides.len() {
            let gap_ms = (canonical[i + 1].unix_time_sec as i128 - canonical[i].unix_time_sec as i128) * 1000;
            if gap_ms > cadence_ms as i128 {
                break;
            }
        }
        run += 1;
    }
    run
}

fn cooldown_remaining_ms(last_trigger: Option<i64>, latest_unix: i64, cooldown_ms: u32) -> u64 {
    let Some(last) = last_trigger else {
        return 0;
    };
    let elapsed_ms = (latest_unix as i128 - last as i128) * 1000;
    (cooldown_ms as i128 - elapsed_ms).clamp(0, u64::MAX as i128) as u64
}

/// Evaluate loosely typed samples, discarding any that are not exact integers.
pub fn evaluate_raw(
    samples: &[RawSample],
    bounds: &Bounds,
    config: &PolicyConfig,
    state: PolicyState,
) -> Decision {
    let typed: Vec<Sample> = samples.iter().filter_map(RawSample::to_sample).collect();
    if typed.len() != samples.len() {
        debug!("Discarded {} malformed samples", samples.len() - typed.len());
    }
    evaluate(&typed, bounds, config, state)
}

/// Decide whether the range break warrants an exit.
pub fn evaluate(
    samples: &[Sample],
    bounds: &Bounds,
    config: &PolicyConfig,
    state: PolicyState,
) -> Decision {
    let canonical = canonicalize(samples);
    let threshold = config.required_consecutive as u64 * config.cadence_ms as u64;

    let hold = |reason_code, samples_used, cooldown_remaining_ms, next_state| Decision {
        action: Action::Hold,
        reason_code,
        debug: DecisionDebug {
            samples_used,
            threshold,
            cooldown_remaining_ms,
        },
        next_state,
    };

    let Some(latest) = canonical.last().copied() else {
        return hold(ReasonCode::DataUnavailable, 0, 0, state);
    };
    let used = canonical.len();
    let cooldown = cooldown_remaining_ms(
        state.last_trigger_unix_time_sec,
        latest.unix_time_sec,
        config.cooldown_ms,
    );

    if state.last_evaluated_sample == Some(latest) {
        return hold(ReasonCode::DuplicateEvaluation, used, cooldown, state);
    }

    if let Some(previous) = state.last_evaluated_sample {
        if latest.slot < previous.slot || latest.unix_time_sec < previous.unix_time_sec {
            return hold(ReasonCode::NonMonotonicSample, used, cooldown, state);
        }
    }

    let sides: Vec<Side> = canonical.iter().map(|s| classify(s, bounds)).collect();
    let latest_side = sides[sides.len() - 1];
    let advanced = PolicyState {
        last_trigger_unix_time_sec: state.last_trigger_unix_time_sec,
        last_evaluated_sample: Some(latest),
    };

    if latest_side == Side::InRange {
        return hold(ReasonCode::InRange, used, cooldown, advanced);
    }

    let run = trailing_run(&canonical, &sides, latest_side, config.cadence_ms);
    if run < config.required_consecutive {
        return hold(ReasonCode::DebounceNotMet, used, cooldown, advanced);
    }

    if cooldown > 0 {
        return hold(ReasonCode::CooldownActive, used, cooldown, advanced);
    }

    let (action, reason_code) = match latest_side {
        Side::Down => (Action::TriggerDown, ReasonCode::TriggerDownConsecutive),
        _ => (Action::TriggerUp, ReasonCode::TriggerUpConsecutive),
    };

    Decision {
        action,
        reason_code,
        debug: DecisionDebug {
            samples_used: used,
            threshold,
            cooldown_remaining_ms: 0,
        },
        next_state: PolicyState {
            last_trigger_unix_time_sec: Some(latest.unix_time_sec),
            last_evaluated_sample: Some(latest),
        },
    }
}
