//! Branch state summarization via the model.
//!
//! The summarizer turns a linearized message list into a [`StateRecord`]
//! by asking the model for strict JSON. Robustness policy: one retry with
//! a stricter prompt on unparseable output, then degrade to an empty
//! record with `topic = "unknown"` so the merge can continue in
//! structural-only mode. Transport errors propagate — they abort the
//! caller's pipeline instead of degrading it.
//!
//! The summarizer is deterministic in input order: the same message
//! sequence produces the same prompt byte-for-byte.

use tracing::warn;

use forky_core::messages::ChatMessage;
use forky_core::model::{ModelClient, ModelError};
use forky_core::state::StateRecord;

const SUMMARY_SYSTEM_PROMPT: &str = "\
You extract structured state from a conversation. Be precise and concise; \
only include items that are explicitly stated or strongly implied.";

const SUMMARY_REQUEST: &str = r#"Analyze the conversation above and output a single JSON object with these fields:
- "facts": array of established facts (things stated as true)
- "decisions": array of decisions that have been made
- "open_questions": array of unresolved questions
- "assumptions": array of assumptions being made
- "topic": one short line naming what the conversation is about

Use [] for categories with no items. Return ONLY the JSON object, no additional text."#;

const STRICT_RETRY_REQUEST: &str = r#"Your previous reply was not valid JSON. Respond again with NOTHING but one JSON object with exactly the keys "facts", "decisions", "open_questions", "assumptions" (arrays of strings) and "topic" (string). No prose, no markdown fences."#;

/// Result of a summarization attempt.
#[derive(Clone, Debug)]
pub struct SummaryOutcome {
    pub record: StateRecord,
    /// True when the model never produced parseable output and the record
    /// is the empty fallback.
    pub degraded: bool,
}

/// Converts linearized histories into state records.
#[derive(Clone, Debug, Default)]
pub struct StateSummarizer;

impl StateSummarizer {
    pub fn new() -> Self {
        Self
    }

    /// Summarize a message list.
    ///
    /// An empty list summarizes to the default record without a model
    /// call (the LCA of two shallow branches is often the bare root).
    pub async fn summarize(
        &self,
        messages: &[ChatMessage],
        client: &dyn ModelClient,
        model: &str,
    ) -> Result<SummaryOutcome, ModelError> {
        if messages.is_empty() {
            return Ok(SummaryOutcome { record: StateRecord::default(), degraded: false });
        }

        let transcript = format_transcript(messages);
        let first = vec![
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(format!("<conversation>\n{transcript}\n</conversation>\n\n{SUMMARY_REQUEST}")),
        ];

        let reply = client.complete(&first, model).await?;
        if let Some(record) = parse_state_record(&reply) {
            return Ok(SummaryOutcome { record, degraded: false });
        }
        warn!(model, "state summary was unparseable, retrying with strict prompt");

        let retry = vec![
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "<conversation>\n{transcript}\n</conversation>\n\n{STRICT_RETRY_REQUEST}"
            )),
        ];
        let reply = client.complete(&retry, model).await?;
        if let Some(record) = parse_state_record(&reply) {
            return Ok(SummaryOutcome { record, degraded: false });
        }

        warn!(model, "state summary failed twice, degrading to structural-only mode");
        Ok(SummaryOutcome { record: StateRecord::unknown(), degraded: true })
    }
}

/// Render messages as `Role: content` lines, preserving order.
fn format_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", capitalize(m.wire_role().to_string().as_str()), m.content()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn parse_state_record(reply: &str) -> Option<StateRecord> {
    serde_json::from_str(&extract_json_block(reply)).ok()
}

/// Strip markdown code fences from a model reply, if present.
pub(crate) fn extract_json_block(reply: &str) -> String {
    let trimmed = reply.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut in_block = false;
    let mut lines: Vec<&str> = Vec::new();
    for line in trimmed.lines() {
        if line.starts_with("```") {
            in_block = !in_block;
            continue;
        }
        if in_block {
            lines.push(line);
        }
    }
    lines.join("\n")
}
