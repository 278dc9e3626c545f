//! End-to-end pipeline runs against a scripted gateway, a recording
//! sink, and an in-memory stats store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use newsgate::audit::AuditLogger;
use newsgate::channels::MessageSink;
use newsgate::config::Thresholds;
use newsgate::error::{ChannelError, GatewayError};
use newsgate::gateway::{FieldValue, ModelGateway, ModelReply, ResponseSchema};
use newsgate::pipeline::FilterPipeline;
use newsgate::stats::{LibSqlStats, StatsStore};

// ── Test doubles ────────────────────────────────────────────────────

/// Routes each prompt to a canned reply by substring match, recording
/// every prompt it sees.
struct ScriptedGateway {
    routes: Vec<(&'static str, Result<ModelReply, String>)>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    fn new(routes: Vec<(&'static str, Result<ModelReply, String>)>) -> Self {
        Self {
            routes,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn saw_prompt_containing(&self, needle: &str) -> bool {
        self.prompts.lock().unwrap().iter().any(|p| p.contains(needle))
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn evaluate(
        &self,
        prompt: &str,
        _schema: Option<&ResponseSchema>,
        _max_tokens: u32,
    ) -> Result<ModelReply, GatewayError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        for (needle, reply) in &self.routes {
            if prompt.contains(needle) {
                return reply
                    .clone()
                    .map_err(|m| GatewayError::Connection(m.clone()));
            }
        }
        Err(GatewayError::Connection("no scripted route".into()))
    }
}

/// Collects everything delivered to it.
#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn delivered(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn deliver(&self, text: &str) -> Result<(), ChannelError> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Always fails delivery.
struct FailingSink;

#[async_trait]
impl MessageSink for FailingSink {
    async fn deliver(&self, _text: &str) -> Result<(), ChannelError> {
        Err(ChannelError::SendFailed {
            chat_id: "123".into(),
            reason: "chat not found".into(),
        })
    }
}

// ── Scripted replies ────────────────────────────────────────────────

fn structured(pairs: &[(&str, FieldValue)]) -> ModelReply {
    ModelReply::Structured(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )
}

fn gate_reply(decision: &str, explanation: &str) -> Result<ModelReply, String> {
    Ok(structured(&[
        ("decision", FieldValue::Text(decision.into())),
        ("explanation", FieldValue::Text(explanation.into())),
    ]))
}

fn context_reply(scores: [i64; 8]) -> Result<ModelReply, String> {
    let keys = [
        "subject",
        "object",
        "which",
        "action",
        "time_place",
        "how",
        "reason",
        "consequences",
    ];
    let mut pairs: Vec<(&str, FieldValue)> = keys
        .iter()
        .zip(scores)
        .map(|(k, s)| (*k, FieldValue::Int(s)))
        .collect();
    pairs.push(("explanation", FieldValue::Text("context".into())));
    Ok(structured(&pairs))
}

fn score_reply(score: i64) -> Result<ModelReply, String> {
    Ok(structured(&[
        ("score", FieldValue::Int(score)),
        ("explanation", FieldValue::Text("notable".into())),
    ]))
}

/// Full script for a message that sails through every stage.
fn accepting_routes() -> Vec<(&'static str, Result<ModelReply, String>)> {
    vec![
        // Commentary first: its prompt embeds characteristic names.
        (
            "Suggest two or three",
            Ok(ModelReply::Text("lean into the rescue drama".into())),
        ),
        ("first filter", gate_reply("Yes", "a real event")),
        ("Current date", context_reply([1, 1, 1, 1, 1, 1, 1, 0])),
        ("emotional vividness", score_reply(9)),
        ("imagery", score_reply(5)),
        ("humor potential", score_reply(2)),
        ("surprise factor", score_reply(3)),
        ("drama", score_reply(4)),
    ]
}

// ── Fixtures ────────────────────────────────────────────────────────

struct Fixture {
    gateway: Arc<ScriptedGateway>,
    stats: Arc<LibSqlStats>,
    forward: Arc<RecordingSink>,
    audit: Arc<RecordingSink>,
    pipeline: FilterPipeline,
}

async fn fixture(routes: Vec<(&'static str, Result<ModelReply, String>)>) -> Fixture {
    let gateway = Arc::new(ScriptedGateway::new(routes));
    let stats = Arc::new(LibSqlStats::new_memory().await.unwrap());
    let forward = Arc::new(RecordingSink::default());
    let audit = Arc::new(RecordingSink::default());
    let pipeline = FilterPipeline::new(
        Arc::clone(&gateway) as Arc<dyn ModelGateway>,
        Arc::clone(&stats) as Arc<dyn StatsStore>,
        Arc::clone(&forward) as Arc<dyn MessageSink>,
        AuditLogger::new(Some(Arc::clone(&audit) as Arc<dyn MessageSink>)),
        Thresholds::default(),
    );
    Fixture {
        gateway,
        stats,
        forward,
        audit,
        pipeline,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn stage1_rejection_stops_the_pipeline() {
    let fx = fixture(vec![(
        "first filter",
        gate_reply("No", "advertisement, not news"),
    )])
    .await;

    let outcome = fx.pipeline.run("Buy pills now 1111\n\nhttp://spam").await;

    assert!(!outcome.forwarded);
    assert!(outcome.failure_notice.is_none());
    assert!(fx.forward.delivered().is_empty());

    // Only the stage-1 call happened.
    assert_eq!(fx.gateway.call_count(), 1);
    assert!(!fx.gateway.saw_prompt_containing("Current date"));
    assert!(!fx.gateway.saw_prompt_containing("News text"));

    let reports = fx.audit.delivered();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("Initial gate (stage 1): No"));
    assert!(reports[0].contains("Context gate (stage 2): not run"));
    assert!(reports[0].contains("Characteristic scoring (stage 3): not run"));

    let summary = fx.stats.get_stats().await.unwrap();
    assert_eq!(summary.total_incoming, 1);
    assert_eq!(summary.total_outgoing, 0);
}

#[tokio::test]
async fn stage2_rejection_skips_scoring() {
    let fx = fixture(vec![
        ("first filter", gate_reply("Yes", "looks like news")),
        ("Current date", context_reply([2, 1, 0, 0, 0, 0, 0, 0])),
    ])
    .await;

    let outcome = fx.pipeline.run("Something happened somewhere").await;

    assert!(!outcome.forwarded);
    assert!(fx.forward.delivered().is_empty());
    assert_eq!(fx.gateway.call_count(), 2);

    let reports = fx.audit.delivered();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("Context gate (stage 2): No"));
    assert!(reports[0].contains("Context score (stage 2): 3"));
    assert!(reports[0].contains("Characteristic scoring (stage 3): not run"));
}

#[tokio::test]
async fn accepted_message_is_forwarded_with_scores_and_commentary() {
    let fx = fixture(accepting_routes()).await;

    let outcome = fx
        .pipeline
        .run("Cat rescued from tree 1111\n\nhttp://x")
        .await;

    assert!(outcome.forwarded);
    assert!(outcome.failure_notice.is_none());

    let forwarded = fx.forward.delivered();
    assert_eq!(forwarded.len(), 1);
    assert!(forwarded[0].starts_with("Cat rescued from tree\n\n1111\n\nhttp://x"));
    assert!(forwarded[0].contains("Overall potential: 23"));
    assert!(forwarded[0].contains("1. Emotion: 9"));
    assert!(forwarded[0].contains("5. Drama: 4"));
    assert!(forwarded[0].contains("Recommendations: lean into the rescue drama"));

    // 1 gate + 1 context + 5 characteristics + 1 commentary.
    assert_eq!(fx.gateway.call_count(), 8);

    let reports = fx.audit.delivered();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("Final decision: Yes"));
    assert!(reports[0].contains("Total potential: 23"));

    let summary = fx.stats.get_stats().await.unwrap();
    assert_eq!(summary.total_incoming, 1);
    assert_eq!(summary.total_outgoing, 1);
}

#[tokio::test]
async fn rejected_total_below_sum_threshold_is_not_forwarded() {
    // One peak score but a total of 6, below the default 6.5 sum bar.
    let fx = fixture(vec![
        ("first filter", gate_reply("Yes", "a real event")),
        ("Current date", context_reply([1, 1, 1, 1, 1, 1, 1, 0])),
        ("emotional vividness", score_reply(6)),
        ("imagery", score_reply(0)),
        ("humor potential", score_reply(0)),
        ("surprise factor", score_reply(0)),
        ("drama", score_reply(0)),
    ])
    .await;

    let outcome = fx.pipeline.run("Mildly interesting event").await;

    assert!(!outcome.forwarded);
    assert!(fx.forward.delivered().is_empty());
    // No commentary call for a rejected message.
    assert!(!fx.gateway.saw_prompt_containing("Suggest two or three"));

    let reports = fx.audit.delivered();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("Final decision: No"));
    assert!(reports[0].contains("Total potential: 6"));

    let summary = fx.stats.get_stats().await.unwrap();
    assert_eq!(summary.total_outgoing, 0);
}

#[tokio::test]
async fn forward_failure_reports_notice_and_keeps_outgoing_at_zero() {
    let gateway = Arc::new(ScriptedGateway::new(accepting_routes()));
    let stats = Arc::new(LibSqlStats::new_memory().await.unwrap());
    let audit = Arc::new(RecordingSink::default());
    let pipeline = FilterPipeline::new(
        Arc::clone(&gateway) as Arc<dyn ModelGateway>,
        Arc::clone(&stats) as Arc<dyn StatsStore>,
        Arc::new(FailingSink),
        AuditLogger::new(Some(Arc::clone(&audit) as Arc<dyn MessageSink>)),
        Thresholds::default(),
    );

    let outcome = pipeline.run("Cat rescued from tree 1111\n\nhttp://x").await;

    assert!(!outcome.forwarded);
    let notice = outcome.failure_notice.unwrap();
    assert!(notice.starts_with("Failed to forward the message:"));

    // The audit trail still records the accepting decision.
    let reports = audit.delivered();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("Final decision: Yes"));

    let summary = stats.get_stats().await.unwrap();
    assert_eq!(summary.total_incoming, 1);
    assert_eq!(summary.total_outgoing, 0);
}

#[tokio::test]
async fn empty_message_is_counted_but_never_evaluated() {
    let fx = fixture(vec![]).await;

    let outcome = fx.pipeline.run("   \n  ").await;

    assert!(!outcome.forwarded);
    assert_eq!(fx.gateway.call_count(), 0);
    assert!(fx.audit.delivered().is_empty());

    let summary = fx.stats.get_stats().await.unwrap();
    assert_eq!(summary.total_incoming, 1);
    assert_eq!(summary.total_outgoing, 0);
}

#[tokio::test]
async fn gateway_outage_closes_the_gate_as_error() {
    let fx = fixture(vec![("first filter", Err("connection refused".into()))]).await;

    let outcome = fx.pipeline.run("Some headline").await;

    assert!(!outcome.forwarded);
    let reports = fx.audit.delivered();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("Initial gate (stage 1): Error"));
    assert!(reports[0].contains("connection refused"));
}
