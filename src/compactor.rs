//! # History Compaction Engine
//!
//! Token-budgeted replacement of older messages with an LLM-generated
//! summary, preserving recent turns verbatim. Grounded in the teacher
//! SDK's own `context` truncation utilities, generalized from a hard
//! truncation to the spec's trigger-then-summarize procedure (§4.5).

use crate::cancel::Cancellation;
use crate::context::estimate_tokens;
use crate::error::Result;
use crate::history::{History, HistoryDialect, Message, MessageContent, Role};
use crate::session::LlmClient;
use crate::templates::{SUMMARIZER_TEMPLATE, SummarizerContext, render};

/// Budgets that decide whether and how the compactor engages.
#[derive(Debug, Clone)]
pub struct CompactionOptions {
    pub max_messages: usize,
    pub max_tokens: u64,
    pub preserve_recent_tokens: u64,
    /// Multiplier applied to `max_messages`/`max_tokens` to derive the
    /// emergency thresholds (§4.5: "Emergency message count >= 1.5x
    /// maxMessages").
    pub emergency_multiplier: f64,
}

impl Default for CompactionOptions {
    fn default() -> Self {
        CompactionOptions {
            max_messages: 40,
            max_tokens: 6_000,
            preserve_recent_tokens: 1_000,
            emergency_multiplier: 1.5,
        }
    }
}

/// Token-budgeted summarizer. `maybe_compact` is the sole entry point;
/// everything else is a private implementation detail of the trigger and
/// rebuild procedure.
pub struct Compactor {
    options: CompactionOptions,
}

impl Compactor {
    pub fn new(options: CompactionOptions) -> Self {
        Compactor { options }
    }

    /// Compact `history` if it has crossed a trigger threshold; otherwise
    /// return the same value unchanged (idempotent under threshold, per the
    /// testable property: "running the compactor a second time with the
    /// same budgets is a no-op").
    pub async fn maybe_compact(
        &self,
        ctx: &Cancellation,
        history: &History,
        summarizer: &dyn LlmClient,
    ) -> Result<History> {
        let token_count = match summarizer.count_tokens(ctx, history).await {
            Ok(count) => count,
            Err(_) => estimate_tokens(history),
        };

        if !self.should_compact(history.len(), token_count) {
            return Ok(history.clone());
        }

        let split = self.choose_split_index(history);
        let prefix = &history.messages[..split];
        let suffix = &history.messages[split..];

        if prefix.is_empty() {
            return Ok(history.clone());
        }

        let conversation = render_prefix_for_summarizer(prefix);
        let prompt = render(
            SUMMARIZER_TEMPLATE,
            &SummarizerContext { conversation },
        )?;

        let summary_history = {
            let mut h = History::new(history.dialect);
            h.push(Message::text(Role::User, prompt));
            h
        };
        let summary_response = match summarizer
            .new_session(
                ctx,
                crate::session::SessionOptions {
                    system_prompt: None,
                    tool_names: Vec::new(),
                    history: Some(summary_history),
                    response_schema: None,
                },
            )
            .await
        {
            Ok(mut session) => session
                .generate_content(ctx, vec![MessageContent::text("Summarize now.")])
                .await?
                .joined_text(),
            Err(_) => String::new(),
        };

        let mut compacted = History::new(history.dialect);
        compacted.push(summary_message(history.dialect, &summary_response));
        compacted.messages.extend(suffix.iter().cloned());
        compacted.summary = Some(summary_response);
        compacted.compacted = true;
        compacted.original_len = Some(history.len());

        Ok(compacted)
    }

    fn should_compact(&self, message_count: usize, token_count: u64) -> bool {
        let emergency_messages =
            (self.options.max_messages as f64 * self.options.emergency_multiplier) as usize;
        let emergency_tokens =
            (self.options.max_tokens as f64 * self.options.emergency_multiplier) as u64;

        message_count >= emergency_messages
            || token_count >= emergency_tokens
            || message_count >= self.options.max_messages
            || token_count >= self.options.max_tokens
    }

    /// Choose a split index so the suffix collectively fits
    /// `preserve_recent_tokens`, always preserving at least the last
    /// message.
    fn choose_split_index(&self, history: &History) -> usize {
        let messages = &history.messages;
        if messages.is_empty() {
            return 0;
        }
        let mut budget = self.options.preserve_recent_tokens;
        let mut split = messages.len();
        for (i, message) in messages.iter().enumerate().rev() {
            let cost = message_token_cost(message);
            if split != messages.len() && cost > budget {
                break;
            }
            budget = budget.saturating_sub(cost);
            split = i;
        }
        split.min(messages.len() - 1).max(0)
    }
}

fn message_token_cost(message: &Message) -> u64 {
    let chars: usize = message
        .content
        .iter()
        .map(|c| match c {
            MessageContent::Text(t) => t.text.chars().count(),
            _ => 16,
        })
        .sum();
    (chars / 4).max(1) as u64
}

fn summary_message(dialect: HistoryDialect, summary: &str) -> Message {
    match dialect {
        HistoryDialect::OpenAi => Message::text(
            Role::System,
            format!("Conversation history summary: {summary}"),
        ),
        HistoryDialect::Claude | HistoryDialect::Gemini => Message::text(
            Role::User,
            format!(
                "--- Previous Conversation Summary ---\nConversation history summary: {summary}\n--- End Summary ---"
            ),
        ),
    }
}

fn render_prefix_for_summarizer(prefix: &[Message]) -> String {
    prefix
        .iter()
        .map(render_message_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_message_line(message: &Message) -> String {
    let role = format!("{:?}", message.role).to_lowercase();
    let mut pieces = Vec::new();
    for content in &message.content {
        match content {
            MessageContent::Text(t) => pieces.push(t.text.clone()),
            MessageContent::ToolCall(call) => {
                let payload = serde_json::to_string(&call.arguments)
                    .unwrap_or_else(|_| "{\"error\":\"failed to marshal tool call arguments\"}".to_string());
                pieces.push(format!("[tool_call {} {}]", call.name, payload));
            }
            MessageContent::ToolResponse(resp) => {
                let payload = serde_json::to_string(&resp.response)
                    .unwrap_or_else(|_| "{\"error\":\"failed to marshal tool response\"}".to_string());
                pieces.push(format!("[tool_response {} {}]", resp.name, payload));
            }
            MessageContent::Image(_) => pieces.push("[image]".to_string()),
            MessageContent::Pdf(_) => pieces.push("[pdf]".to_string()),
        }
    }
    format!("{role}: {}", pieces.join(" "))
}
