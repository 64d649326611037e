//! # Canonical History Model
//!
//! The unified, cross-provider conversation representation. Every other
//! subsystem in the crate (the agent loop, the compactor, the planner) reads
//! and writes this representation; [`openai`], [`claude`], and [`gemini`]
//! are strictly wire adapters that translate to and from it.
//!
//! Re-architecture note carried from the spec's Design Notes: content is a
//! tagged enum (not an inheritance hierarchy or a duck-typed map), and each
//! provider dialect lives in its own submodule so adding a fourth provider
//! is additive — a new `history::bedrock` module and two functions, nothing
//! else in the crate needs to change.

pub mod claude;
pub mod gemini;
pub mod openai;

use std::collections::BTreeSet;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// The schema version written by this crate. Deserializing a [`History`]
/// whose `version` field doesn't match this constant fails with
/// [`Error::HistoryVersionMismatch`] rather than guessing at a migration.
pub const CURRENT_HISTORY_VERSION: u32 = 1;

/// Which provider wire dialect a [`History`] was produced from / is destined
/// for. Carried as a typed enum (not a string) so a mismatched conversion
/// request is a value the compiler can exhaustively match on, not a typo
/// away from silently doing the wrong thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryDialect {
    OpenAi,
    Claude,
    Gemini,
}

impl Serialize for HistoryDialect {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            HistoryDialect::OpenAi => "OpenAI",
            HistoryDialect::Claude => "claude",
            HistoryDialect::Gemini => "gemini",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> Deserialize<'de> for HistoryDialect {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "OpenAI" => Ok(HistoryDialect::OpenAi),
            "claude" => Ok(HistoryDialect::Claude),
            "gemini" => Ok(HistoryDialect::Gemini),
            other => Err(serde::de::Error::custom(format!(
                "unknown history dialect '{other}'"
            ))),
        }
    }
}

/// Message participant role. Maps onto each provider dialect's own role
/// vocabulary in `openai`/`claude`/`gemini`; see each module's `role_to_wire`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// OpenAI's vision `detail` hint on image content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

fn is_false(b: &bool) -> bool {
    !*b
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(b) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(b);
                serializer.serialize_some(&encoded)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(s.as_bytes())
                    .map_err(serde::de::Error::custom)?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }
}

/// Plain text content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        TextBlock { text: text.into() }
    }
}

/// Image content: exactly one of `data_bytes`/`url` is expected to be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    #[serde(
        rename = "dataBytes",
        default,
        with = "base64_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub data_bytes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ImageDetail>,
}

impl ImageBlock {
    pub fn from_bytes(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        ImageBlock {
            media_type: media_type.into(),
            data_bytes: Some(bytes),
            url: None,
            detail: None,
        }
    }

    pub fn from_url(media_type: impl Into<String>, url: impl Into<String>) -> Self {
        ImageBlock {
            media_type: media_type.into(),
            data_bytes: None,
            url: Some(url.into()),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: ImageDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// PDF content: exactly one of `data_bytes`/`url` is expected to be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfBlock {
    #[serde(
        rename = "dataBytes",
        default,
        with = "base64_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub data_bytes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A model-issued tool invocation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallBlock {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
    /// Set when `arguments` was reconstructed from a source string that
    /// failed to parse as JSON (see [`parse_tool_arguments`]); the original
    /// string is preserved under the `_raw` key inside `arguments` rather
    /// than dropped, so the model can still see what it emitted.
    #[serde(default, skip_serializing_if = "is_false")]
    pub arguments_malformed: bool,
}

impl ToolCallBlock {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        ToolCallBlock {
            id: id.into(),
            name: name.into(),
            arguments,
            arguments_malformed: false,
        }
    }
}

/// Parse a tool call's wire-format argument string into a JSON object.
///
/// Providers such as OpenAI transmit arguments as a string that is expected
/// to parse as JSON. If it doesn't (a truncated stream, a model that emits
/// slightly invalid JSON), the spec requires the data survive rather than
/// crash the loop: the raw string is kept under `_raw` and the call is
/// marked `arguments_malformed`.
pub fn parse_tool_arguments(raw: &str) -> (Map<String, Value>, bool) {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => (map, false),
        Ok(other) => {
            let mut map = Map::new();
            map.insert("_raw".to_string(), other);
            (map, true)
        }
        Err(_) => {
            let mut map = Map::new();
            map.insert("_raw".to_string(), Value::String(raw.to_string()));
            (map, true)
        }
    }
}

/// The result of a tool invocation, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponseBlock {
    #[serde(rename = "toolCallId")]
    pub tool_call_id: String,
    pub name: String,
    pub response: Map<String, Value>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

/// A single unit of message content. Tagged by `type`, matching the
/// persisted JSON format in the spec (`{type, data}`): serde's
/// `tag`/`content` representation produces exactly that shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MessageContent {
    #[serde(rename = "text")]
    Text(TextBlock),
    #[serde(rename = "image")]
    Image(ImageBlock),
    #[serde(rename = "pdf")]
    Pdf(PdfBlock),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallBlock),
    #[serde(rename = "tool_response")]
    ToolResponse(ToolResponseBlock),
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text(TextBlock::new(text))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallBlock> {
        match self {
            MessageContent::ToolCall(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tool_response(&self) -> Option<&ToolResponseBlock> {
        match self {
            MessageContent::ToolResponse(t) => Some(t),
            _ => None,
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(rename = "contents")]
    pub content: Vec<MessageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Message {
    pub fn new(role: Role, content: Vec<MessageContent>) -> Self {
        Message {
            role,
            content,
            name: None,
            metadata: None,
        }
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Message::new(role, vec![MessageContent::text(text)])
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Joined text of every [`MessageContent::Text`] block, in order,
    /// separated by newlines — the canonical "what did this message say"
    /// view used by the agent loop and the compactor's summarizer prompt.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Ordered sequence of messages, tagged with its origin dialect, a schema
/// version, and optional compaction metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(rename = "type")]
    pub dialect: HistoryDialect,
    pub version: u32,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub compacted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_len: Option<usize>,
}

impl History {
    pub fn new(dialect: HistoryDialect) -> Self {
        History {
            dialect,
            version: CURRENT_HISTORY_VERSION,
            messages: Vec::new(),
            summary: None,
            compacted: false,
            original_len: None,
        }
    }

    pub fn with_messages(dialect: HistoryDialect, messages: Vec<Message>) -> Self {
        History {
            dialect,
            version: CURRENT_HISTORY_VERSION,
            messages,
            summary: None,
            compacted: false,
            original_len: None,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn append(&mut self, mut other: History) {
        self.messages.append(&mut other.messages);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Semantically-identity-preserving deep clone. A plain `.clone()` is
    /// already deep since every field is owned data; this exists so callers
    /// reaching for the spec's documented "JSON round-trip is acceptable"
    /// escape hatch have one, e.g. when cloning through an `Arc`-erased
    /// boundary where `Clone` isn't available.
    pub fn deep_clone_via_json(&self) -> Result<History> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Parse a persisted history, enforcing the schema version.
    pub fn from_json(value: Value) -> Result<History> {
        let version = value
            .get("version")
            .and_then(Value::as_u64)
            .map(|v| v as u32);
        if let Some(found) = version {
            if found != CURRENT_HISTORY_VERSION {
                return Err(Error::history_version_mismatch(
                    CURRENT_HISTORY_VERSION,
                    found,
                ));
            }
        }
        let history: History = serde_json::from_value(value)?;
        history.validate()?;
        Ok(history)
    }

    /// Enforce the cross-message invariant: every `tool_response` must
    /// reference a `tool_call` id introduced earlier in the same history.
    pub fn validate(&self) -> Result<()> {
        let mut seen_ids: BTreeSet<&str> = BTreeSet::new();
        for message in &self.messages {
            for content in &message.content {
                match content {
                    MessageContent::ToolCall(call) => {
                        seen_ids.insert(call.id.as_str());
                    }
                    MessageContent::ToolResponse(resp) => {
                        if !seen_ids.contains(resp.tool_call_id.as_str()) {
                            return Err(Error::invalid_history_data(format!(
                                "tool_response references unknown tool_call_id '{}'",
                                resp.tool_call_id
                            )));
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Require this history be tagged for `expected`; used by conversion
    /// entry points to surface `ErrLLMTypeMismatch` rather than silently
    /// reinterpreting foreign-dialect data.
    pub fn require_dialect(&self, expected: HistoryDialect) -> Result<()> {
        if self.dialect != expected {
            return Err(Error::llm_type_mismatch(expected, self.dialect));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_serializes_to_spec_strings() {
        assert_eq!(
            serde_json::to_value(HistoryDialect::OpenAi).unwrap(),
            "OpenAI"
        );
        assert_eq!(
            serde_json::to_value(HistoryDialect::Claude).unwrap(),
            "claude"
        );
        assert_eq!(
            serde_json::to_value(HistoryDialect::Gemini).unwrap(),
            "gemini"
        );
    }

    #[test]
    fn validate_rejects_dangling_tool_response() {
        let mut history = History::new(HistoryDialect::OpenAi);
        history.push(Message::new(
            Role::Tool,
            vec![MessageContent::ToolResponse(ToolResponseBlock {
                tool_call_id: "missing".into(),
                name: "noop".into(),
                response: Map::new(),
                is_error: false,
            })],
        ));
        assert!(history.validate().is_err());
    }

    #[test]
    fn validate_accepts_matched_call_and_response() {
        let mut history = History::new(HistoryDialect::OpenAi);
        history.push(Message::new(
            Role::Assistant,
            vec![MessageContent::ToolCall(ToolCallBlock::new(
                "c1",
                "get_weather",
                Map::new(),
            ))],
        ));
        history.push(Message::new(
            Role::Tool,
            vec![MessageContent::ToolResponse(ToolResponseBlock {
                tool_call_id: "c1".into(),
                name: "get_weather".into(),
                response: Map::new(),
                is_error: false,
            })],
        ));
        assert!(history.validate().is_ok());
    }

    #[test]
    fn malformed_tool_arguments_are_preserved_and_marked() {
        let (map, malformed) = parse_tool_arguments("not json");
        assert!(malformed);
        assert_eq!(map.get("_raw").unwrap(), "not json");
    }

    #[test]
    fn well_formed_tool_arguments_parse_cleanly() {
        let (map, malformed) = parse_tool_arguments(r#"{"city":"Tokyo"}"#);
        assert!(!malformed);
        assert_eq!(map.get("city").unwrap(), "Tokyo");
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let value = serde_json::json!({
            "type": "OpenAI",
            "version": 999,
            "messages": [],
        });
        let err = History::from_json(value).unwrap_err();
        assert!(matches!(err, Error::HistoryVersionMismatch { .. }));
    }

    #[test]
    fn image_bytes_round_trip_through_base64_json() {
        let block = ImageBlock::from_bytes("image/png", vec![1, 2, 3, 4]);
        let content = MessageContent::Image(block.clone());
        let value = serde_json::to_value(&content).unwrap();
        assert!(value["data"]["dataBytes"].is_string());
        let back: MessageContent = serde_json::from_value(value).unwrap();
        assert_eq!(back, content);
    }
}
