//! Claude-style wire format: blocks of `{role: user|assistant, content[]}`,
//! with the system prompt carried as a separate parameter rather than a
//! message in the array — the same shape the Anthropic Messages API uses.
//!
//! Because Claude has only two message roles, `tool` and (non-leading)
//! `system` canonical messages both fold into `user` messages on the way
//! out, and a `user` message whose content is *entirely* `tool_result`
//! blocks is recognized as a folded `tool` message on the way back in, so
//! the common case round-trips cleanly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ImageBlock, Message, MessageContent, PdfBlock, Role, ToolCallBlock, ToolResponseBlock};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: Vec<ClaudeContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClaudeContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: ClaudeImageSource },
    #[serde(rename = "document")]
    Document { source: ClaudeImageSource },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Map<String, Value>,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "is_false")]
        is_error: bool,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClaudeImageSource {
    #[serde(rename = "base64")]
    Base64 { media_type: String, data: String },
    #[serde(rename = "url")]
    Url { url: String },
}

/// Convert Claude wire messages (plus the separate system prompt, if any)
/// into the canonical [`Message`] sequence. The system prompt, when present,
/// becomes a leading `Role::System` message — this is what lets a
/// canonical→Claude→canonical round trip restore it losslessly, per the
/// "system is a separate parameter to the adapter" note.
pub fn from_claude(system: Option<&str>, messages: &[ClaudeMessage]) -> Result<Vec<Message>> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system_text) = system {
        out.push(Message::text(Role::System, system_text));
    }

    for wire in messages {
        let wire_role = match wire.role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => {
                return Err(Error::invalid_history_data(format!(
                    "unknown Claude role '{other}'"
                )));
            }
        };

        let all_tool_results = !wire.content.is_empty()
            && wire
                .content
                .iter()
                .all(|block| matches!(block, ClaudeContentBlock::ToolResult { .. }));

        let role = if wire_role == Role::User && all_tool_results {
            Role::Tool
        } else {
            wire_role
        };

        let mut content = Vec::with_capacity(wire.content.len());
        for block in &wire.content {
            match block {
                ClaudeContentBlock::Text { text } => {
                    content.push(MessageContent::text(text.clone()));
                }
                ClaudeContentBlock::Image { source } => {
                    content.push(MessageContent::Image(image_from_source(source)));
                }
                ClaudeContentBlock::Document { source } => {
                    content.push(MessageContent::Pdf(pdf_from_source(source)));
                }
                ClaudeContentBlock::ToolUse { id, name, input } => {
                    content.push(MessageContent::ToolCall(ToolCallBlock::new(
                        id.clone(),
                        name.clone(),
                        input.clone(),
                    )));
                }
                ClaudeContentBlock::ToolResult {
                    tool_use_id,
                    content: text,
                    is_error,
                } => {
                    content.push(MessageContent::ToolResponse(ToolResponseBlock {
                        tool_call_id: tool_use_id.clone(),
                        name: String::new(),
                        response: text_to_response_map(text),
                        is_error: *is_error,
                    }));
                }
            }
        }
        out.push(Message::new(role, content));
    }
    Ok(out)
}

/// Convert canonical [`Message`]s into Claude wire messages, returning the
/// extracted system prompt (if the leading message was `Role::System`)
/// alongside the message array.
pub fn to_claude(messages: &[Message]) -> Result<(Option<String>, Vec<ClaudeMessage>)> {
    let mut messages = messages;
    let mut system = None;
    if let Some(first) = messages.first() {
        if first.role == Role::System {
            system = Some(first.joined_text());
            messages = &messages[1..];
        }
    }

    let mut out: Vec<ClaudeMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        let blocks = content_to_blocks(message)?;
        match message.role {
            Role::Assistant => out.push(ClaudeMessage {
                role: "assistant".to_string(),
                content: blocks,
            }),
            Role::User | Role::System | Role::Tool => {
                // Tool responses and non-leading system messages fold into
                // user turns; consecutive tool messages merge into one.
                if message.role == Role::Tool
                    && out
                        .last()
                        .map(|m| m.role == "user" && is_all_tool_result(&m.content))
                        .unwrap_or(false)
                {
                    out.last_mut().unwrap().content.extend(blocks);
                } else {
                    out.push(ClaudeMessage {
                        role: "user".to_string(),
                        content: blocks,
                    });
                }
            }
        }
    }
    Ok((system, out))
}

fn is_all_tool_result(blocks: &[ClaudeContentBlock]) -> bool {
    !blocks.is_empty()
        && blocks
            .iter()
            .all(|b| matches!(b, ClaudeContentBlock::ToolResult { .. }))
}

fn content_to_blocks(message: &Message) -> Result<Vec<ClaudeContentBlock>> {
    let mut blocks = Vec::with_capacity(message.content.len());
    for item in &message.content {
        match item {
            MessageContent::Text(t) => blocks.push(ClaudeContentBlock::Text {
                text: t.text.clone(),
            }),
            MessageContent::Image(img) => blocks.push(ClaudeContentBlock::Image {
                source: image_to_source(img),
            }),
            MessageContent::Pdf(pdf) => blocks.push(ClaudeContentBlock::Document {
                source: pdf_to_source(pdf),
            }),
            MessageContent::ToolCall(call) => blocks.push(ClaudeContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.arguments.clone(),
            }),
            MessageContent::ToolResponse(resp) => blocks.push(ClaudeContentBlock::ToolResult {
                tool_use_id: resp.tool_call_id.clone(),
                content: response_map_to_text(&resp.response)?,
                is_error: resp.is_error,
            }),
        }
    }
    Ok(blocks)
}

fn image_to_source(img: &ImageBlock) -> ClaudeImageSource {
    if let Some(bytes) = &img.data_bytes {
        use base64::Engine as _;
        ClaudeImageSource::Base64 {
            media_type: img.media_type.clone(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    } else {
        ClaudeImageSource::Url {
            url: img.url.clone().unwrap_or_default(),
        }
    }
}

fn image_from_source(source: &ClaudeImageSource) -> ImageBlock {
    match source {
        ClaudeImageSource::Base64 { media_type, data } => {
            use base64::Engine as _;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(data.as_bytes())
                .unwrap_or_default();
            ImageBlock {
                media_type: media_type.clone(),
                data_bytes: Some(bytes),
                url: None,
                detail: None,
            }
        }
        ClaudeImageSource::Url { url } => {
            ImageBlock::from_url("image/unknown".to_string(), url.clone())
        }
    }
}

fn pdf_to_source(pdf: &PdfBlock) -> ClaudeImageSource {
    if let Some(bytes) = &pdf.data_bytes {
        use base64::Engine as _;
        ClaudeImageSource::Base64 {
            media_type: "application/pdf".to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    } else {
        ClaudeImageSource::Url {
            url: pdf.url.clone().unwrap_or_default(),
        }
    }
}

fn pdf_from_source(source: &ClaudeImageSource) -> PdfBlock {
    match source {
        ClaudeImageSource::Base64 { data, .. } => {
            use base64::Engine as _;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(data.as_bytes())
                .unwrap_or_default();
            PdfBlock {
                data_bytes: Some(bytes),
                url: None,
            }
        }
        ClaudeImageSource::Url { url } => PdfBlock {
            data_bytes: None,
            url: Some(url.clone()),
        },
    }
}

fn text_to_response_map(text: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("text".to_string(), Value::String(text.to_string()));
            map
        }
    }
}

fn response_map_to_text(map: &Map<String, Value>) -> Result<String> {
    Ok(serde_json::to_string(map)?)
}
