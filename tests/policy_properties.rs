//! Order and duplication invariance of the range-break policy

use clmm_autopilot::decision::{evaluate, Action, PolicyConfig, PolicyState, ReasonCode};
use clmm_autopilot::types::{Bounds, Sample};

fn config() -> PolicyConfig {
    PolicyConfig {
        required_consecutive: 3,
        cadence_ms: 1_000,
        cooldown_ms: 10_000,
    }
}

fn bounds() -> Bounds {
    Bounds::new(100, 200)
}

/// Small deterministic family covering every reason code the policy can reach
/// from a fresh or triggered state.
fn sample_sets() -> Vec<Vec<Sample>> {
    let ticks = [[95, 94, 93], [205, 210, 220], [90, 120, 130], [95, 150, 93], [99, 100, 101], [201, 99, 250]];
    let mut sets = Vec::new();
    for (n, t) in ticks.iter().enumerate() {
        let base = 1_000 + n as i64 * 100;
        sets.push(vec![
            Sample::new(n as u64 * 10 + 1, base, t[0]),
            Sample::new(n as u64 * 10 + 2, base + 1, t[1]),
            Sample::new(n as u64 * 10 + 3, base + 2, t[2]),
        ]);
        // wide gaps, same ticks
        sets.push(vec![
            Sample::new(n as u64 * 10 + 1, base, t[0]),
            Sample::new(n as u64 * 10 + 2, base + 5, t[1]),
            Sample::new(n as u64 * 10 + 3, base + 10, t[2]),
        ]);
    }
    sets
}

fn states() -> Vec<PolicyState> {
    vec![
        PolicyState::default(),
        PolicyState {
            last_trigger_unix_time_sec: Some(995),
            last_evaluated_sample: None,
        },
        PolicyState {
            last_trigger_unix_time_sec: None,
            last_evaluated_sample: Some(Sample::new(0, 900, 150)),
        },
    ]
}

fn permutations(samples: &[Sample]) -> Vec<Vec<Sample>> {
    let mut out = Vec::new();
    for shift in 0..samples.len() {
        let mut rotated = samples.to_vec();
        rotated.rotate_left(shift);
        out.push(rotated.clone());
        rotated.reverse();
        out.push(rotated);
    }
    out
}

#[test]
fn test_permutations_yield_identical_decisions() {
    for state in states() {
        for samples in sample_sets() {
            let expected = evaluate(&samples, &bounds(), &config(), state);
            for permuted in permutations(&samples) {
                assert_eq!(
                    evaluate(&permuted, &bounds(), &config(), state),
                    expected,
                    "samples {permuted:?}"
                );
            }
        }
    }
}

#[test]
fn test_duplicates_yield_identical_decisions() {
    for state in states() {
        for samples in sample_sets() {
            let expected = evaluate(&samples, &bounds(), &config(), state);

            let mut doubled = samples.clone();
            doubled.extend(samples.iter().rev().copied());
            assert_eq!(evaluate(&doubled, &bounds(), &config(), state), expected);

            let mut repeated_last = samples.clone();
            repeated_last.push(samples[samples.len() - 1]);
            repeated_last.insert(0, samples[samples.len() - 1]);
            assert_eq!(evaluate(&repeated_last, &bounds(), &config(), state), expected);
        }
    }
}

#[test]
fn test_threaded_state_over_cycles() {
    let mut state = PolicyState::default();
    let mut window: Vec<Sample> = Vec::new();
    let mut actions = Vec::new();

    // ticks drift below the range and stay there for 14 seconds
    for i in 0..15u64 {
        window.push(Sample::new(i + 1, 1_000 + i as i64, 90));
        let decision = evaluate(&window, &bounds(), &config(), state);
        state = decision.next_state;
        actions.push((decision.action, decision.reason_code));
    }

    assert_eq!(actions[0], (Action::Hold, ReasonCode::DebounceNotMet));
    assert_eq!(actions[1], (Action::Hold, ReasonCode::DebounceNotMet));
    assert_eq!(actions[2], (Action::TriggerDown, ReasonCode::TriggerDownConsecutive));
    for action in &actions[3..12] {
        assert_eq!(*action, (Action::Hold, ReasonCode::CooldownActive));
    }
    // 10 s after the trigger at t=1002
    assert_eq!(actions[12], (Action::TriggerDown, ReasonCode::TriggerDownConsecutive));
    assert_eq!(state.last_trigger_unix_time_sec, Some(1_012));
}

#[test]
fn test_empty_input_never_moves_state() {
    for state in states() {
        let decision = evaluate(&[], &bounds(), &config(), state);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.reason_code, ReasonCode::DataUnavailable);
        assert_eq!(decision.next_state, state);
    }
}
