//! # Context Window Management
//!
//! Manual token estimation and history truncation utilities, carried over
//! from the teacher SDK's own `context` module (`estimate_tokens`,
//! `is_approaching_limit`, `truncate_messages`) and generalized from a flat
//! `Vec<Message>` to the canonical [`History`]. The compactor uses these as
//! its char/4 fallback when `LLMClient::count_tokens` is unavailable or
//! fails (§4.5).

use crate::history::{History, MessageContent};

/// Characters per token used by the fallback estimator. This is the same
/// ~70-85%-accurate-across-model-families approximation the teacher SDK
/// documents for its own `estimate_tokens`.
const CHARS_PER_TOKEN: usize = 4;

/// Estimate token count for a history using the char/4 approximation. Only
/// text content contributes; tool-call/response payloads are stringified
/// via JSON first so their size is represented too.
pub fn estimate_tokens(history: &History) -> u64 {
    let mut chars = 0usize;
    for message in &history.messages {
        for content in &message.content {
            chars += content_char_len(content);
        }
    }
    (chars / CHARS_PER_TOKEN).max(if chars > 0 { 1 } else { 0 }) as u64
}

fn content_char_len(content: &MessageContent) -> usize {
    match content {
        MessageContent::Text(t) => t.text.chars().count(),
        MessageContent::Image(_) => 0,
        MessageContent::Pdf(_) => 0,
        MessageContent::ToolCall(call) => {
            serde_json::to_string(&call.arguments)
                .map(|s| s.chars().count())
                .unwrap_or(0)
                + call.name.chars().count()
        }
        MessageContent::ToolResponse(resp) => serde_json::to_string(&resp.response)
            .map(|s| s.chars().count())
            .unwrap_or(0),
    }
}

/// True if `history`'s estimated token count is at or past `limit`. Used
/// proactively by callers who want to truncate before the compactor's own
/// trigger thresholds engage.
pub fn is_approaching_limit(history: &History, limit: u64) -> bool {
    estimate_tokens(history) >= limit
}

/// Keep only the most recent `keep_last` messages, optionally preserving a
/// leading system message regardless of how many turns that leaves.
pub fn truncate_messages(history: &History, keep_last: usize, preserve_system: bool) -> History {
    let mut truncated = history.clone();
    if truncated.messages.len() <= keep_last {
        return truncated;
    }

    let system_message = if preserve_system {
        truncated
            .messages
            .first()
            .filter(|m| m.role == crate::history::Role::System)
            .cloned()
    } else {
        None
    };

    let start = truncated.messages.len() - keep_last;
    truncated.messages = truncated.messages.split_off(start);

    if let Some(system) = system_message {
        if truncated.messages.first().map(|m| m.role) != Some(crate::history::Role::System) {
            truncated.messages.insert(0, system);
        }
    }
    truncated
}
