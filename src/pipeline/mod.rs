//! The staged filtration pipeline.
//!
//! Every inbound message flows: incoming counter → envelope split →
//! stage 1 gate → stage 2 gate → stage 3 scoring → decision policy →
//! conditional forward → audit report, which runs exactly once per
//! message no matter where the pipeline stopped. All per-message state
//! lives in locals; runs are safe to execute concurrently.

pub mod decision;
pub mod envelope;
pub mod prompts;
pub mod stages;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audit::AuditLogger;
use crate::channels::MessageSink;
use crate::config::Thresholds;
use crate::gateway::ModelGateway;
use crate::stats::{EventKind, StatsStore};

use decision::{NO_COMMENTARY, Verdict, decide, generate_commentary};
use envelope::{Envelope, PART_DELIMITER};
use stages::{CharacteristicSet, ContextResult, GateResult};

/// Everything gathered during one pipeline run, for the audit trail.
///
/// `None` in `stage2`/`stage3` means "not run" — distinguishable from
/// a stage that ran and scored zero.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub envelope: Envelope,
    pub stage1: GateResult,
    pub stage2: Option<ContextResult>,
    pub stage3: Option<CharacteristicSet>,
    pub verdict: Option<Verdict>,
}

/// What the caller needs to know after a run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    /// Whether the message was forwarded to the destination chat.
    pub forwarded: bool,
    /// A notice to send back to the original sender, set only when
    /// forwarding was attempted and failed.
    pub failure_notice: Option<String>,
}

/// The staged filtration pipeline with its injected collaborators.
pub struct FilterPipeline {
    gateway: Arc<dyn ModelGateway>,
    stats: Arc<dyn StatsStore>,
    forward: Arc<dyn MessageSink>,
    audit: AuditLogger,
    thresholds: Thresholds,
}

impl FilterPipeline {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        stats: Arc<dyn StatsStore>,
        forward: Arc<dyn MessageSink>,
        audit: AuditLogger,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            gateway,
            stats,
            forward,
            audit,
            thresholds,
        }
    }

    /// Run one inbound message through the full pipeline.
    pub async fn run(&self, text: &str) -> PipelineOutcome {
        self.record(EventKind::Incoming).await;

        if text.trim().is_empty() {
            debug!("Empty message, nothing to evaluate");
            return PipelineOutcome::default();
        }

        let envelope = Envelope::parse(text);
        info!(chars = envelope.body.len(), "Processing inbound message");

        // Stage 1 — initial gate.
        let stage1 = stages::initial_gate(self.gateway.as_ref(), &envelope).await;
        if !stage1.decision.passed() {
            let report = PipelineReport {
                envelope,
                stage1,
                stage2: None,
                stage3: None,
                verdict: None,
            };
            self.audit.publish(&report).await;
            return PipelineOutcome::default();
        }

        // Stage 2 — context gate.
        let stage2 =
            stages::context_gate(self.gateway.as_ref(), &envelope.body, self.thresholds.context)
                .await;
        if !stage2.decision.passed() {
            let report = PipelineReport {
                envelope,
                stage1,
                stage2: Some(stage2),
                stage3: None,
                verdict: None,
            };
            self.audit.publish(&report).await;
            return PipelineOutcome::default();
        }

        // Stage 3 — characteristic scoring, then the decision policy.
        let characteristics =
            stages::score_characteristics(self.gateway.as_ref(), &envelope.body).await;
        let verdict = decide(stage2.decision, &characteristics, &self.thresholds);

        let commentary = if verdict.accepted {
            generate_commentary(
                self.gateway.as_ref(),
                &envelope.body,
                &characteristics,
                self.thresholds.max_potential,
            )
            .await
        } else {
            NO_COMMENTARY.to_string()
        };

        info!(
            accepted = verdict.accepted,
            total_potential = verdict.total_potential,
            "Final decision made"
        );

        let mut outcome = PipelineOutcome::default();
        if verdict.accepted {
            let forward_text = compose_forward_message(&envelope, &characteristics, &commentary);
            match self.forward.deliver(&forward_text).await {
                Ok(()) => {
                    self.record(EventKind::Outgoing).await;
                    outcome.forwarded = true;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to forward accepted message");
                    outcome.failure_notice =
                        Some(format!("Failed to forward the message: {e}"));
                }
            }
        }

        let report = PipelineReport {
            envelope,
            stage1,
            stage2: Some(stage2),
            stage3: Some(characteristics),
            verdict: Some(verdict),
        };
        self.audit.publish(&report).await;

        outcome
    }

    /// Best-effort counter append. Storage trouble is logged, never
    /// fails the run.
    async fn record(&self, kind: EventKind) {
        if let Err(e) = self.stats.record_event(kind).await {
            warn!(error = %e, ?kind, "Failed to record stats event");
        }
    }
}

/// Compose the enriched message forwarded to the destination chat.
fn compose_forward_message(
    envelope: &Envelope,
    characteristics: &CharacteristicSet,
    commentary: &str,
) -> String {
    let score_lines = characteristics
        .iter()
        .enumerate()
        .map(|(i, (c, cs))| format!("{}. {}: {}", i + 1, c.label(), cs.score))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\n{PART_DELIMITER}{}\n\n{PART_DELIMITER}Overall potential: {}\n{}\n\n{PART_DELIMITER}Recommendations: {}",
        envelope.body,
        envelope.link_or_sentinel(),
        characteristics.total_potential(),
        score_lines,
        commentary,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stages::CharacteristicScore;

    #[test]
    fn forward_message_has_fixed_sections_and_order() {
        let cs = |score: i64| CharacteristicScore {
            score,
            explanation: "why".into(),
        };
        let set = CharacteristicSet {
            emotion: cs(9),
            imagery: cs(5),
            humor: cs(2),
            surprise: cs(3),
            drama: cs(4),
        };
        let envelope = Envelope::parse("Cat rescued from tree 1111\n\nhttp://x");
        let text = compose_forward_message(&envelope, &set, "lean into the rescue drama");

        assert!(text.starts_with("Cat rescued from tree\n\n1111\n\nhttp://x"));
        assert!(text.contains("Overall potential: 23"));
        let emotion_pos = text.find("1. Emotion: 9").unwrap();
        let imagery_pos = text.find("2. Imagery: 5").unwrap();
        let humor_pos = text.find("3. Humor: 2").unwrap();
        let surprise_pos = text.find("4. Surprise: 3").unwrap();
        let drama_pos = text.find("5. Drama: 4").unwrap();
        assert!(emotion_pos < imagery_pos);
        assert!(imagery_pos < humor_pos);
        assert!(humor_pos < surprise_pos);
        assert!(surprise_pos < drama_pos);
        assert!(text.ends_with("Recommendations: lean into the rescue drama"));
    }

    #[test]
    fn forward_message_uses_link_sentinel() {
        let cs = |score: i64| CharacteristicScore {
            score,
            explanation: String::new(),
        };
        let set = CharacteristicSet {
            emotion: cs(8),
            imagery: cs(0),
            humor: cs(0),
            surprise: cs(0),
            drama: cs(0),
        };
        let envelope = Envelope::parse("No link here");
        let text = compose_forward_message(&envelope, &set, "n/a");
        assert!(text.contains("1111\n\nNo link\n\n1111"));
    }
}
