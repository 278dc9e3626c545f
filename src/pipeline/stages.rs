//! Stage result types and the three stage evaluators.
//!
//! Each evaluator builds its prompt, calls the gateway once (five times
//! for stage 3), and normalizes whatever came back into a typed result.
//! A failed call degrades into `GateDecision::Error` or a zero score
//! with the stringified error as the explanation — it is never treated
//! as a pass.

use tracing::{info, warn};

use crate::gateway::{ModelGateway, ModelReply, ResponseSchema, StructuredReply};
use crate::pipeline::envelope::Envelope;
use crate::pipeline::prompts;

/// Token budget for the yes/no gate call.
const GATE_MAX_TOKENS: u32 = 500;

/// Token budget for the eight-dimension context call.
const CONTEXT_MAX_TOKENS: u32 = 800;

/// Token budget for each characteristic call.
const CHARACTERISTIC_MAX_TOKENS: u32 = 500;

// ── Gate result ─────────────────────────────────────────────────────

/// Outcome of a gating stage. `Error` means the call failed — a closed
/// gate, but distinguishable in the audit trail from the model saying No.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Yes,
    No,
    Error,
}

impl GateDecision {
    pub fn passed(self) -> bool {
        self == Self::Yes
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Yes => "Yes",
            Self::No => "No",
            Self::Error => "Error",
        })
    }
}

/// Stage 1 result.
#[derive(Debug, Clone)]
pub struct GateResult {
    pub decision: GateDecision,
    pub explanation: String,
}

// ── Context result ──────────────────────────────────────────────────

/// The eight journalistic-context sub-scores, 0–10 each.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextScores {
    pub subject: i64,
    pub object: i64,
    pub which: i64,
    pub action: i64,
    pub time_place: i64,
    pub how: i64,
    pub reason: i64,
    pub consequences: i64,
}

impl ContextScores {
    pub fn total(&self) -> i64 {
        self.subject
            + self.object
            + self.which
            + self.action
            + self.time_place
            + self.how
            + self.reason
            + self.consequences
    }
}

/// Stage 2 result. `total` is always the sum of the sub-scores, and the
/// decision is `Yes` iff `total` reached the context threshold.
#[derive(Debug, Clone)]
pub struct ContextResult {
    pub scores: ContextScores,
    pub total: i64,
    pub decision: GateDecision,
    pub explanation: String,
}

// ── Characteristics ─────────────────────────────────────────────────

/// The five stylistic/emotional characteristics scored in stage 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Characteristic {
    Emotion,
    Imagery,
    Humor,
    Surprise,
    Drama,
}

impl Characteristic {
    /// Fixed presentation order.
    pub const ALL: [Characteristic; 5] = [
        Self::Emotion,
        Self::Imagery,
        Self::Humor,
        Self::Surprise,
        Self::Drama,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Emotion => "Emotion",
            Self::Imagery => "Imagery",
            Self::Humor => "Humor",
            Self::Surprise => "Surprise",
            Self::Drama => "Drama",
        }
    }

    fn instructions(self) -> &'static str {
        match self {
            Self::Emotion => prompts::EMOTION_INSTRUCTIONS,
            Self::Imagery => prompts::IMAGERY_INSTRUCTIONS,
            Self::Humor => prompts::HUMOR_INSTRUCTIONS,
            Self::Surprise => prompts::SURPRISE_INSTRUCTIONS,
            Self::Drama => prompts::DRAMA_INSTRUCTIONS,
        }
    }
}

/// One characteristic's score and explanation.
#[derive(Debug, Clone)]
pub struct CharacteristicScore {
    pub score: i64,
    pub explanation: String,
}

/// All five characteristic scores from stage 3.
#[derive(Debug, Clone)]
pub struct CharacteristicSet {
    pub emotion: CharacteristicScore,
    pub imagery: CharacteristicScore,
    pub humor: CharacteristicScore,
    pub surprise: CharacteristicScore,
    pub drama: CharacteristicScore,
}

impl CharacteristicSet {
    pub fn get(&self, characteristic: Characteristic) -> &CharacteristicScore {
        match characteristic {
            Characteristic::Emotion => &self.emotion,
            Characteristic::Imagery => &self.imagery,
            Characteristic::Humor => &self.humor,
            Characteristic::Surprise => &self.surprise,
            Characteristic::Drama => &self.drama,
        }
    }

    /// Scores in fixed presentation order.
    pub fn scores(&self) -> [i64; 5] {
        Characteristic::ALL.map(|c| self.get(c).score)
    }

    /// Sum of the five scores.
    pub fn total_potential(&self) -> i64 {
        self.scores().iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Characteristic, &CharacteristicScore)> {
        Characteristic::ALL.iter().map(|&c| (c, self.get(c)))
    }
}

// ── Evaluators ──────────────────────────────────────────────────────

/// Stage 1: initial relevance gate.
pub async fn initial_gate(gateway: &dyn ModelGateway, envelope: &Envelope) -> GateResult {
    let schema = ResponseSchema::new()
        .enumeration("decision", &["Yes", "No"])
        .text("explanation");
    let prompt = prompts::initial_gate_prompt(envelope);

    let result = match gateway.evaluate(&prompt, Some(&schema), GATE_MAX_TOKENS).await {
        Ok(ModelReply::Structured(reply)) => GateResult {
            decision: gate_decision(&reply, "decision"),
            explanation: text_of(&reply, "explanation"),
        },
        Ok(ModelReply::Text(raw)) => GateResult {
            decision: GateDecision::Error,
            explanation: format!("unstructured reply: {raw}"),
        },
        Err(e) => {
            warn!(stage = 1, error = %e, "Gateway call failed");
            GateResult {
                decision: GateDecision::Error,
                explanation: e.to_string(),
            }
        }
    };

    info!(stage = 1, decision = %result.decision, "Initial gate evaluated");
    result
}

/// Stage 2: eight-dimension context gate.
pub async fn context_gate(
    gateway: &dyn ModelGateway,
    body: &str,
    context_threshold: i64,
) -> ContextResult {
    let schema = ResponseSchema::new()
        .score("subject")
        .score("object")
        .score("which")
        .score("action")
        .score("time_place")
        .score("how")
        .score("reason")
        .score("consequences")
        .text("explanation");
    let prompt = prompts::context_gate_prompt(body);

    let result = match gateway
        .evaluate(&prompt, Some(&schema), CONTEXT_MAX_TOKENS)
        .await
    {
        Ok(ModelReply::Structured(reply)) => {
            let scores = ContextScores {
                subject: int_of(&reply, "subject"),
                object: int_of(&reply, "object"),
                which: int_of(&reply, "which"),
                action: int_of(&reply, "action"),
                time_place: int_of(&reply, "time_place"),
                how: int_of(&reply, "how"),
                reason: int_of(&reply, "reason"),
                consequences: int_of(&reply, "consequences"),
            };
            let total = scores.total();
            let decision = if total >= context_threshold {
                GateDecision::Yes
            } else {
                GateDecision::No
            };
            ContextResult {
                scores,
                total,
                decision,
                explanation: text_of(&reply, "explanation"),
            }
        }
        Ok(ModelReply::Text(raw)) => context_error(format!("unstructured reply: {raw}")),
        Err(e) => {
            warn!(stage = 2, error = %e, "Gateway call failed");
            context_error(e.to_string())
        }
    };

    info!(
        stage = 2,
        total = result.total,
        decision = %result.decision,
        "Context gate evaluated"
    );
    result
}

/// Stage 3: five independent characteristic scorings, issued
/// concurrently. One failing call zeroes that characteristic only.
pub async fn score_characteristics(
    gateway: &dyn ModelGateway,
    body: &str,
) -> CharacteristicSet {
    let (emotion, imagery, humor, surprise, drama) = futures::join!(
        score_one(gateway, body, Characteristic::Emotion),
        score_one(gateway, body, Characteristic::Imagery),
        score_one(gateway, body, Characteristic::Humor),
        score_one(gateway, body, Characteristic::Surprise),
        score_one(gateway, body, Characteristic::Drama),
    );

    let set = CharacteristicSet {
        emotion,
        imagery,
        humor,
        surprise,
        drama,
    };
    info!(
        stage = 3,
        total_potential = set.total_potential(),
        "Characteristics scored"
    );
    set
}

async fn score_one(
    gateway: &dyn ModelGateway,
    body: &str,
    characteristic: Characteristic,
) -> CharacteristicScore {
    let schema = ResponseSchema::new().score("score").text("explanation");
    let prompt = prompts::characteristic_prompt(body, characteristic.instructions());

    match gateway
        .evaluate(&prompt, Some(&schema), CHARACTERISTIC_MAX_TOKENS)
        .await
    {
        Ok(ModelReply::Structured(reply)) => CharacteristicScore {
            score: int_of(&reply, "score"),
            explanation: text_of(&reply, "explanation"),
        },
        Ok(ModelReply::Text(raw)) => CharacteristicScore {
            score: 0,
            explanation: format!("unstructured reply: {raw}"),
        },
        Err(e) => {
            warn!(
                stage = 3,
                characteristic = characteristic.label(),
                error = %e,
                "Gateway call failed"
            );
            CharacteristicScore {
                score: 0,
                explanation: e.to_string(),
            }
        }
    }
}

// ── Reply helpers ───────────────────────────────────────────────────

fn context_error(explanation: String) -> ContextResult {
    ContextResult {
        scores: ContextScores::default(),
        total: 0,
        decision: GateDecision::Error,
        explanation,
    }
}

fn gate_decision(reply: &StructuredReply, key: &str) -> GateDecision {
    match reply.get(key).and_then(|v| v.as_text()) {
        Some("Yes") => GateDecision::Yes,
        Some("No") => GateDecision::No,
        _ => GateDecision::Error,
    }
}

fn text_of(reply: &StructuredReply, key: &str) -> String {
    reply.get(key).map(ToString::to_string).unwrap_or_default()
}

/// Integer field value; non-integer values contribute 0.
fn int_of(reply: &StructuredReply, key: &str) -> i64 {
    reply.get(key).and_then(|v| v.as_int()).unwrap_or(0)
}
