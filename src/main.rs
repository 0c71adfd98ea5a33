//! Dry-run entry point for the range-exit policy
//!
//! Evaluates the configured policy against a samples file and prints the
//! decision. Nothing is signed or sent.
//!
//! ```text
//! clmm-autopilot <config.json> <samples.json> <lower-tick> <upper-tick>
//! ```

use anyhow::{bail, Context, Result};
use clmm_autopilot::decision::{evaluate_raw, PolicyState};
use clmm_autopilot::{AutopilotConfig, Bounds, RawSample};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [config_path, samples_path, lower, upper] = args.as_slice() else {
        bail!("usage: clmm-autopilot <config.json> <samples.json> <lower-tick> <upper-tick>");
    };

    let config = AutopilotConfig::from_json_file(config_path)?;
    let bounds = Bounds::new(
        lower.parse().with_context(|| format!("Invalid lower tick {lower}"))?,
        upper.parse().with_context(|| format!("Invalid upper tick {upper}"))?,
    );
    if bounds.lower_tick_index > bounds.upper_tick_index {
        bail!("Lower tick {} is above upper tick {}", bounds.lower_tick_index, bounds.upper_tick_index);
    }

    let raw = tokio::fs::read_to_string(samples_path)
        .await
        .with_context(|| format!("Failed to read samples file {samples_path}"))?;
    let samples: Vec<RawSample> =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse samples file {samples_path}"))?;

    info!(
        "Evaluating {} samples against [{}, {}] on {}",
        samples.len(),
        bounds.lower_tick_index,
        bounds.upper_tick_index,
        config.cluster
    );

    let decision = evaluate_raw(&samples, &bounds, &config.policy, PolicyState::default());
    info!("Decision: {:?} ({:?})", decision.action, decision.reason_code);
    println!("{}", serde_json::to_string_pretty(&decision)?);

    Ok(())
}
