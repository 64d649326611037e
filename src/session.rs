//! # Session and LLMClient — the provider boundary
//!
//! `LLMClient` and `Session` are the only points where the core reaches out
//! to an actual LLM provider, and per §1's Non-goals the core never
//! implements that reach itself — these are traits a caller supplies an
//! implementation for (an HTTP client, a local model runner, a test
//! double). `#[async_trait]` is used here for the same reason the teacher
//! SDK and the rest of the retrieved pack reach for it: an object-safe
//! async trait without hand-rolling `Pin<Box<dyn Future>>` at every call
//! site.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cancel::Cancellation;
use crate::error::Result;
use crate::history::{History, HistoryDialect};

/// A model-issued call to a tool, carried in the channel between `Session`
/// and `Agent`. The runtime-layer twin of `MessageContent::ToolCall`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// The result of dispatching a `FunctionCall`, fed back to the model on the
/// next turn. The runtime-layer twin of `MessageContent::ToolResponse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub result: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FunctionResponse {
    pub fn success(id: impl Into<String>, name: impl Into<String>, result: Map<String, Value>) -> Self {
        FunctionResponse {
            id: id.into(),
            name: name.into(),
            result,
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, name: impl Into<String>, error: impl Into<String>) -> Self {
        FunctionResponse {
            id: id.into(),
            name: name.into(),
            result: Map::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A single (possibly partial) reply from the model. Streaming yields a
/// finite sequence of these whose fields accumulate additively (§9,
/// "Streaming accumulation").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub texts: Vec<String>,
    pub function_calls: Vec<FunctionCall>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn joined_text(&self) -> String {
        self.texts.join("")
    }

    /// Fold `chunk` into `self` additively: texts and function calls append,
    /// token counts add, and `error` is sticky-last (a later `Some`
    /// overwrites an earlier one; a later `None` does not clear it).
    pub fn accumulate(&mut self, chunk: Response) {
        self.texts.extend(chunk.texts);
        self.function_calls.extend(chunk.function_calls);
        self.input_tokens += chunk.input_tokens;
        self.output_tokens += chunk.output_tokens;
        if let Some(error) = chunk.error {
            self.error = Some(error);
        }
    }
}

/// Options passed to `LLMClient::new_session`.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub system_prompt: Option<String>,
    pub tool_names: Vec<String>,
    pub history: Option<History>,
    pub response_schema: Option<Value>,
}

/// The provider boundary. A caller supplies one implementation per LLM
/// backend; the core never constructs one itself.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn new_session(
        &self,
        ctx: &Cancellation,
        options: SessionOptions,
    ) -> Result<Box<dyn Session>>;

    /// Not used by the core loop; a passthrough exposed for callers that
    /// want to generate embeddings through the same client.
    async fn generate_embedding(
        &self,
        ctx: &Cancellation,
        dim: usize,
        inputs: &[String],
    ) -> Result<Vec<Vec<f64>>>;

    /// Used by the compactor's trigger logic. Falls back to a char/4
    /// estimate in `Compactor` when this returns an error.
    async fn count_tokens(&self, ctx: &Cancellation, history: &History) -> Result<u64>;
}

/// A live, stateful conversation with one LLM provider.
#[async_trait]
pub trait Session: Send + Sync {
    fn dialect(&self) -> HistoryDialect;

    async fn generate_content(
        &mut self,
        ctx: &Cancellation,
        inputs: Vec<crate::history::MessageContent>,
    ) -> Result<Response>;

    /// Streamed generation. Implementations send partial `Response`s over
    /// the channel, closing the sender exactly once when generation
    /// completes or errors (§5, "closed exactly once by the producer").
    async fn generate_stream(
        &mut self,
        ctx: &Cancellation,
        inputs: Vec<crate::history::MessageContent>,
    ) -> Result<tokio::sync::mpsc::Receiver<Response>>;

    fn history(&self) -> &History;

    fn append_history(&mut self, history: History);
}
