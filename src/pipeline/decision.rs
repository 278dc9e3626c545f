//! Final decision policy and commentary generation.
//!
//! `decide` is pure — thresholds in, verdict out. Commentary is the one
//! free-text gateway call in the pipeline and only happens on accept.

use tracing::warn;

use crate::config::Thresholds;
use crate::gateway::{ModelGateway, ModelReply};
use crate::pipeline::prompts;
use crate::pipeline::stages::{CharacteristicSet, GateDecision};

/// Output-length budget for commentary generation.
const COMMENTARY_MAX_TOKENS: u32 = 200;

/// Placeholder commentary for rejected messages.
pub const NO_COMMENTARY: &str = "No recommendations.";

/// Fallback commentary when generation itself fails.
pub const COMMENTARY_FAILED: &str = "Could not generate recommendations.";

/// The final accept/reject verdict.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub accepted: bool,
    pub total_potential: i64,
    /// Whether any characteristic reached the peak threshold.
    pub has_peak: bool,
}

/// Combine stage outputs into the final decision.
///
/// Accept iff the context gate passed, the summed potential reaches the
/// sum threshold, and at least one characteristic reaches the peak
/// threshold.
pub fn decide(
    context_decision: GateDecision,
    characteristics: &CharacteristicSet,
    thresholds: &Thresholds,
) -> Verdict {
    let total_potential = characteristics.total_potential();
    let has_peak = characteristics
        .scores()
        .iter()
        .any(|&s| s >= thresholds.max_potential);
    let accepted = context_decision.passed()
        && (total_potential as f64) >= thresholds.sum_potential
        && has_peak;

    Verdict {
        accepted,
        total_potential,
        has_peak,
    }
}

/// Bulleted `- <Name> (score N): <explanation>` lines for every
/// characteristic at or above the peak threshold.
pub fn peak_lines(characteristics: &CharacteristicSet, max_potential: i64) -> String {
    characteristics
        .iter()
        .filter(|(_, cs)| cs.score >= max_potential)
        .map(|(c, cs)| format!("- {} (score {}): {}", c.label(), cs.score, cs.explanation))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Generate commentary recommendations for an accepted message.
///
/// A gateway failure degrades to a fixed fallback string — the accept
/// decision is already made and stands.
pub async fn generate_commentary(
    gateway: &dyn ModelGateway,
    body: &str,
    characteristics: &CharacteristicSet,
    max_potential: i64,
) -> String {
    let lines = peak_lines(characteristics, max_potential);
    let prompt = prompts::commentary_prompt(body, &lines);

    match gateway.evaluate(&prompt, None, COMMENTARY_MAX_TOKENS).await {
        Ok(ModelReply::Text(text)) => text,
        Ok(ModelReply::Structured(_)) => COMMENTARY_FAILED.to_string(),
        Err(e) => {
            warn!(error = %e, "Commentary generation failed");
            COMMENTARY_FAILED.to_string()
        }
    }
}
