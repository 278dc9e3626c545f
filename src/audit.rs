//! Audit trail — one formatted report per pipeline run, delivered to
//! the audit chat.
//!
//! The report is HTML for Telegram's parse mode, so every piece of user
//! or model text is escaped first; message content can never become
//! markup. Delivery failures are logged and swallowed — the forwarding
//! decision is already made and the audit trail never changes it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::channels::MessageSink;
use crate::pipeline::PipelineReport;
use crate::pipeline::envelope::PART_DELIMITER;

/// Marker for stages that were short-circuited before running.
const NOT_RUN: &str = "not run";

/// Audit logger with an injected delivery sink. `None` disables
/// delivery but keeps the pipeline fully functional.
pub struct AuditLogger {
    sink: Option<Arc<dyn MessageSink>>,
}

impl AuditLogger {
    pub fn new(sink: Option<Arc<dyn MessageSink>>) -> Self {
        Self { sink }
    }

    /// Deliver the report for one pipeline run. Never fails the caller.
    pub async fn publish(&self, report: &PipelineReport) {
        let Some(sink) = &self.sink else {
            debug!("Audit sink not configured, report not delivered");
            return;
        };

        let text = render_report(report);
        if let Err(e) = sink.deliver(&text).await {
            warn!(error = %e, "Failed to deliver audit report");
        }
    }
}

/// Render the full decision trail as an HTML-escaped report.
///
/// Characteristic scores and the final verdict appear only when stage 2
/// actually passed; skipped stages are marked "not run" so a skip is
/// never mistaken for a zero score.
pub fn render_report(report: &PipelineReport) -> String {
    let mut out = format!(
        "Original message:\n\n{}\n\n{PART_DELIMITER}Link: {}\n\n{PART_DELIMITER}",
        escape_html(&report.envelope.body),
        escape_html(report.envelope.link_or_sentinel()),
    );

    out.push_str(&format!(
        "Initial gate (stage 1): {}\nExplanation: {}\n",
        report.stage1.decision,
        escape_html(&report.stage1.explanation),
    ));

    match &report.stage2 {
        Some(context) => {
            out.push_str(&format!(
                "Context gate (stage 2): {}\nContext score (stage 2): {}\n",
                context.decision, context.total,
            ));
        }
        None => {
            out.push_str(&format!("Context gate (stage 2): {NOT_RUN}\n"));
        }
    }

    match (&report.stage3, &report.verdict) {
        (Some(characteristics), Some(verdict)) => {
            out.push_str("\n--- Characteristic scores ---\n");
            for (characteristic, score) in characteristics.iter() {
                out.push_str(&format!("{}: {}\n", characteristic.label(), score.score));
            }
            out.push_str(&format!(
                "\nFinal decision: {}\nTotal potential: {}\n",
                if verdict.accepted { "Yes" } else { "No" },
                verdict.total_potential,
            ));
        }
        _ => {
            out.push_str(&format!("Characteristic scoring (stage 3): {NOT_RUN}\n"));
        }
    }

    out
}

/// Escape HTML metacharacters so content stays data, never structure.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}
