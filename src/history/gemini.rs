//! Gemini-style wire format: `{role: user|model, parts[]}`. Like Claude,
//! Gemini has no `system`/`tool` message role, but unlike the Claude
//! adapter there is no separate system parameter in the wire contract
//! given here — a `system` message folds into a `user` turn and, per the
//! round-trip law in the spec, does not come back out the other side as
//! `system` again. `tool` messages fold into `user` turns carrying
//! `function_response` parts and *do* round-trip, since a `user` message
//! made up entirely of `function_response` parts is unambiguous.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ImageBlock, Message, MessageContent, PdfBlock, Role, ToolCallBlock, ToolResponseBlock};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    pub role: String,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "inlineData", default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<GeminiBlob>,
    #[serde(rename = "fileData", default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<GeminiFileRef>,
    #[serde(rename = "functionCall", default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GeminiFunctionCall>,
    #[serde(
        rename = "functionResponse",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub function_response: Option<GeminiFunctionResponse>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        GeminiPart {
            text: Some(text.into()),
            inline_data: None,
            file_data: None,
            function_call: None,
            function_response: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiBlob {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFileRef {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "fileUri")]
    pub file_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    pub name: String,
    pub args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFunctionResponse {
    pub name: String,
    pub response: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Convert Gemini wire content into the canonical [`Message`] sequence.
pub fn from_gemini(contents: &[GeminiContent]) -> Result<Vec<Message>> {
    let mut out = Vec::with_capacity(contents.len());
    for wire in contents {
        let wire_role = match wire.role.as_str() {
            "user" => Role::User,
            "model" => Role::Assistant,
            other => {
                return Err(Error::invalid_history_data(format!(
                    "unknown Gemini role '{other}'"
                )));
            }
        };

        let all_function_responses = !wire.parts.is_empty()
            && wire.parts.iter().all(|p| p.function_response.is_some());

        let role = if wire_role == Role::User && all_function_responses {
            Role::Tool
        } else {
            wire_role
        };

        let mut content = Vec::with_capacity(wire.parts.len());
        for part in &wire.parts {
            if let Some(text) = &part.text {
                content.push(MessageContent::text(text.clone()));
            }
            if let Some(blob) = &part.inline_data {
                if blob.mime_type == "application/pdf" {
                    content.push(MessageContent::Pdf(pdf_from_blob(blob)));
                } else {
                    content.push(MessageContent::Image(image_from_blob(blob)));
                }
            }
            if let Some(file) = &part.file_data {
                if file.mime_type == "application/pdf" {
                    content.push(MessageContent::Pdf(PdfBlock {
                        data_bytes: None,
                        url: Some(file.file_uri.clone()),
                    }));
                } else {
                    content.push(MessageContent::Image(ImageBlock::from_url(
                        file.mime_type.clone(),
                        file.file_uri.clone(),
                    )));
                }
            }
            if let Some(call) = &part.function_call {
                content.push(MessageContent::ToolCall(ToolCallBlock::new(
                    call.id.clone().unwrap_or_else(|| call.name.clone()),
                    call.name.clone(),
                    call.args.clone(),
                )));
            }
            if let Some(response) = &part.function_response {
                content.push(MessageContent::ToolResponse(ToolResponseBlock {
                    tool_call_id: response.id.clone().unwrap_or_else(|| response.name.clone()),
                    name: response.name.clone(),
                    response: response.response.clone(),
                    is_error: false,
                }));
            }
        }
        out.push(Message::new(role, content));
    }
    Ok(out)
}

/// Convert canonical [`Message`]s into Gemini wire content. `system` folds
/// into a `user` turn, matching the general round-trip law (lossy: it does
/// not come back out as `system`).
pub fn to_gemini(messages: &[Message]) -> Result<Vec<GeminiContent>> {
    let mut out: Vec<GeminiContent> = Vec::with_capacity(messages.len());
    for message in messages {
        let parts = content_to_parts(message)?;
        let role = match message.role {
            Role::Assistant => "model",
            Role::User | Role::System | Role::Tool => "user",
        };

        if message.role == Role::Tool
            && out
                .last()
                .map(|c| c.role == "user" && is_all_function_response(&c.parts))
                .unwrap_or(false)
        {
            out.last_mut().unwrap().parts.extend(parts);
        } else {
            out.push(GeminiContent {
                role: role.to_string(),
                parts,
            });
        }
    }
    Ok(out)
}

fn is_all_function_response(parts: &[GeminiPart]) -> bool {
    !parts.is_empty() && parts.iter().all(|p| p.function_response.is_some())
}

fn content_to_parts(message: &Message) -> Result<Vec<GeminiPart>> {
    let mut parts = Vec::with_capacity(message.content.len());
    for item in &message.content {
        match item {
            MessageContent::Text(t) => parts.push(GeminiPart::text(t.text.clone())),
            MessageContent::Image(img) => parts.push(image_to_part(img)),
            MessageContent::Pdf(pdf) => parts.push(pdf_to_part(pdf)),
            MessageContent::ToolCall(call) => {
                parts.push(GeminiPart {
                    text: None,
                    inline_data: None,
                    file_data: None,
                    function_call: Some(GeminiFunctionCall {
                        name: call.name.clone(),
                        args: call.arguments.clone(),
                        id: Some(call.id.clone()),
                    }),
                    function_response: None,
                });
            }
            MessageContent::ToolResponse(resp) => {
                parts.push(GeminiPart {
                    text: None,
                    inline_data: None,
                    file_data: None,
                    function_call: None,
                    function_response: Some(GeminiFunctionResponse {
                        name: resp.name.clone(),
                        response: resp.response.clone(),
                        id: Some(resp.tool_call_id.clone()),
                    }),
                });
            }
        }
    }
    Ok(parts)
}

fn image_to_part(img: &ImageBlock) -> GeminiPart {
    let mut part = GeminiPart {
        text: None,
        inline_data: None,
        file_data: None,
        function_call: None,
        function_response: None,
    };
    if let Some(bytes) = &img.data_bytes {
        use base64::Engine as _;
        part.inline_data = Some(GeminiBlob {
            mime_type: img.media_type.clone(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        });
    } else if let Some(url) = &img.url {
        part.file_data = Some(GeminiFileRef {
            mime_type: img.media_type.clone(),
            file_uri: url.clone(),
        });
    }
    part
}

fn image_from_blob(blob: &GeminiBlob) -> ImageBlock {
    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(blob.data.as_bytes())
        .unwrap_or_default();
    ImageBlock {
        media_type: blob.mime_type.clone(),
        data_bytes: Some(bytes),
        url: None,
        detail: None,
    }
}

fn pdf_to_part(pdf: &PdfBlock) -> GeminiPart {
    let mut part = GeminiPart {
        text: None,
        inline_data: None,
        file_data: None,
        function_call: None,
        function_response: None,
    };
    if let Some(bytes) = &pdf.data_bytes {
        use base64::Engine as _;
        part.inline_data = Some(GeminiBlob {
            mime_type: "application/pdf".to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        });
    } else if let Some(url) = &pdf.url {
        part.file_data = Some(GeminiFileRef {
            mime_type: "application/pdf".to_string(),
            file_uri: url.clone(),
        });
    }
    part
}

fn pdf_from_blob(blob: &GeminiBlob) -> PdfBlock {
    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(blob.data.as_bytes())
        .unwrap_or_default();
    PdfBlock {
        data_bytes: Some(bytes),
        url: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_messages_round_trip_via_function_response_folding() {
        let messages = vec![
            Message::text(Role::User, "Hi"),
            Message::new(
                Role::Assistant,
                vec![MessageContent::ToolCall(ToolCallBlock::new(
                    "c1",
                    "get_weather",
                    Map::new(),
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
        ];
        let wire = to_gemini(&messages).unwrap();
        assert_eq!(wire[1].role, "model");
        assert_eq!(wire[2].role, "user");

        let back = from_gemini(&wire).unwrap();
        assert_eq!(back.len(), messages.len());
        assert_eq!(back[2].role, Role::Tool);
        let resp = back[2].content[0].as_tool_response().unwrap();
        assert_eq!(resp.tool_call_id, "c1");
    }

    #[test]
    fn system_folds_into_user_and_is_not_restored() {
        let messages = vec![Message::text(Role::System, "be nice")];
        let wire = to_gemini(&messages).unwrap();
        assert_eq!(wire[0].role, "user");
        let back = from_gemini(&wire).unwrap();
        assert_eq!(back[0].role, Role::User);
    }
}
