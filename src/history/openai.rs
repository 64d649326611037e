//! OpenAI-style wire format: `{role, content, name?, tool_calls?, tool_call_id?}`.
//!
//! Content is either a plain string (the common case, kept for backward
//! compatibility with text-only conversations) or an array of typed parts
//! (needed once an image enters the message) — the same text-or-parts
//! duality the teacher SDK's own `OpenAIContent` used for vision payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    ImageBlock, ImageDetail, Message, MessageContent, PdfBlock, Role, ToolCallBlock,
    ToolResponseBlock, parse_tool_arguments,
};
use crate::error::{Error, Result};

/// A single OpenAI chat message on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<OpenAiContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Text-or-parts content container. Untagged so a plain string round-trips
/// as a plain string (no array wrapper) for ordinary text-only messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OpenAiContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: OpenAiImageUrl },
    #[serde(rename = "file")]
    File { file: OpenAiFile },
}

impl OpenAiContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        OpenAiContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>, detail: ImageDetail) -> Self {
        OpenAiContentPart::ImageUrl {
            image_url: OpenAiImageUrl {
                url: url.into(),
                detail: Some(detail),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ImageDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Convert OpenAI wire messages into the canonical [`Message`] sequence.
pub fn from_openai(messages: &[OpenAiMessage]) -> Result<Vec<Message>> {
    let mut out = Vec::with_capacity(messages.len());
    for wire in messages {
        let role = match wire.role.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            // Legacy "function" role is accepted as an alias for "tool".
            "tool" | "function" => Role::Tool,
            other => {
                return Err(Error::invalid_history_data(format!(
                    "unknown OpenAI role '{other}'"
                )));
            }
        };

        let mut content = Vec::new();
        if let Some(wire_content) = &wire.content {
            match wire_content {
                OpenAiContent::Text(text) => {
                    if role == Role::Tool {
                        content.push(MessageContent::ToolResponse(ToolResponseBlock {
                            tool_call_id: wire.tool_call_id.clone().unwrap_or_default(),
                            name: wire.name.clone().unwrap_or_default(),
                            response: text_to_response_map(text),
                            is_error: false,
                        }));
                    } else if !text.is_empty() {
                        content.push(MessageContent::text(text.clone()));
                    }
                }
                OpenAiContent::Parts(parts) => {
                    for part in parts {
                        match part {
                            OpenAiContentPart::Text { text } => {
                                content.push(MessageContent::text(text.clone()));
                            }
                            OpenAiContentPart::ImageUrl { image_url } => {
                                content.push(MessageContent::Image(ImageBlock {
                                    media_type: "image/unknown".to_string(),
                                    data_bytes: None,
                                    url: Some(image_url.url.clone()),
                                    detail: image_url.detail,
                                }));
                            }
                            OpenAiContentPart::File { file } => {
                                content.push(MessageContent::Pdf(PdfBlock {
                                    data_bytes: None,
                                    url: file.file_url.clone(),
                                }));
                            }
                        }
                    }
                }
            }
        }

        if let Some(tool_calls) = &wire.tool_calls {
            for call in tool_calls {
                let (arguments, malformed) = parse_tool_arguments(&call.function.arguments);
                content.push(MessageContent::ToolCall(ToolCallBlock {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    arguments,
                    arguments_malformed: malformed,
                }));
            }
        }

        let mut message = Message::new(role, content);
        message.name = wire.name.clone();
        out.push(message);
    }
    Ok(out)
}

/// Convert canonical [`Message`]s into OpenAI wire messages.
pub fn to_openai(messages: &[Message]) -> Result<Vec<OpenAiMessage>> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let mut texts = Vec::new();
        let mut parts = Vec::new();
        let mut tool_calls = Vec::new();
        let mut tool_response: Option<&ToolResponseBlock> = None;
        let mut has_non_text = false;

        for block in &message.content {
            match block {
                MessageContent::Text(t) => {
                    texts.push(t.text.clone());
                    parts.push(OpenAiContentPart::text(t.text.clone()));
                }
                MessageContent::Image(img) => {
                    has_non_text = true;
                    if let Some(url) = &img.url {
                        parts.push(OpenAiContentPart::image_url(
                            url.clone(),
                            img.detail.unwrap_or(ImageDetail::Auto),
                        ));
                    } else if let Some(bytes) = &img.data_bytes {
                        use base64::Engine as _;
                        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                        let data_url = format!("data:{};base64,{encoded}", img.media_type);
                        parts.push(OpenAiContentPart::image_url(
                            data_url,
                            img.detail.unwrap_or(ImageDetail::Auto),
                        ));
                    }
                }
                MessageContent::Pdf(pdf) => {
                    has_non_text = true;
                    parts.push(OpenAiContentPart::File {
                        file: OpenAiFile {
                            file_data: None,
                            file_url: pdf.url.clone(),
                        },
                    });
                }
                MessageContent::ToolCall(call) => {
                    let arguments = serde_json::to_string(&call.arguments)?;
                    tool_calls.push(OpenAiToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: OpenAiFunctionCall {
                            name: call.name.clone(),
                            arguments,
                        },
                    });
                }
                MessageContent::ToolResponse(resp) => {
                    tool_response = Some(resp);
                }
            }
        }

        let (content, tool_call_id) = if let Some(resp) = tool_response {
            (
                Some(OpenAiContent::Text(response_map_to_text(&resp.response)?)),
                Some(resp.tool_call_id.clone()),
            )
        } else if has_non_text {
            (Some(OpenAiContent::Parts(parts)), None)
        } else if !texts.is_empty() {
            (Some(OpenAiContent::Text(texts.join("\n"))), None)
        } else {
            (None, None)
        };

        out.push(OpenAiMessage {
            role: role.to_string(),
            content,
            name: message.name.clone(),
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            tool_call_id,
        });
    }
    Ok(out)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{History, HistoryDialect};

    fn sample_messages() -> Vec<Message> {
        let mut arguments = Map::new();
        arguments.insert("city".to_string(), Value::String("Tokyo".to_string()));
        vec![
            Message::text(Role::System, "You are helpful"),
            Message::text(Role::User, "Hi"),
            Message::new(
                Role::Assistant,
                vec![MessageContent::ToolCall(ToolCallBlock::new(
                    "c1",
                    "get_weather",
                    arguments,
                ))],
            ),
            Message::new(
                Role::Tool,
                vec![MessageContent::ToolResponse(ToolResponseBlock {
                    tool_call_id: "c1".to_string(),
                    name: "get_weather".to_string(),
                    response: {
                        let mut m = Map::new();
                        m.insert("t".to_string(), Value::Number(22.into()));
                        m
                    },
                    is_error: false,
                })],
            ),
        ]
    }

    #[test]
    fn round_trips_text_and_tool_messages() {
        let original = sample_messages();
        let wire = to_openai(&original).unwrap();
        let back = from_openai(&wire).unwrap();
        assert_eq!(back.len(), original.len());
        assert_eq!(back[0].role, Role::System);
        assert_eq!(back[1].joined_text(), "Hi");
        let call = back[2].content[0].as_tool_call().unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.id, "c1");
        let resp = back[3].content[0].as_tool_response().unwrap();
        assert_eq!(resp.tool_call_id, "c1");
        assert_eq!(resp.response.get("t").unwrap(), 22);
    }

    #[test]
    fn history_json_round_trips() {
        let history = History::with_messages(HistoryDialect::OpenAi, sample_messages());
        let value = serde_json::to_value(&history).unwrap();
        let back = History::from_json(value).unwrap();
        assert_eq!(back, history);
    }

    #[test]
    fn malformed_function_call_arguments_survive() {
        let wire = vec![OpenAiMessage {
            role: "assistant".to_string(),
            content: None,
            name: None,
            tool_calls: Some(vec![OpenAiToolCall {
                id: "c9".to_string(),
                kind: "function".to_string(),
                function: OpenAiFunctionCall {
                    name: "broken".to_string(),
                    arguments: "{not valid".to_string(),
                },
            }]),
            tool_call_id: None,
        }];
        let messages = from_openai(&wire).unwrap();
        let call = messages[0].content[0].as_tool_call().unwrap();
        assert!(call.arguments_malformed);
        assert!(call.arguments.contains_key("_raw"));
    }
}
