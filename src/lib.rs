//! # agent-core
//!
//! Provider-neutral orchestration core for agentic LLM runtimes: a unified
//! history model, tool dispatch, the agent execution loop, context
//! compaction, and a plan/reflect executor.
//!
//! This crate does not talk to any LLM provider itself — it defines the
//! [`LlmClient`]/[`Session`] boundary a caller implements once per backend
//! (OpenAI, Claude, Gemini, a local model runner, a test double) and
//! everything above that boundary: a cross-provider [`History`] model with
//! lossless wire conversions, a [`Registry`] that validates and dispatches
//! tool calls through a middleware chain, an [`Agent`] loop whose
//! termination policy is pluggable via [`Strategy`], a token-budgeted
//! [`Compactor`], a [`PlanExecutor`] for decompose-execute-reflect workflows,
//! and a [`SubAgent`] adapter that lets one agent call another as an
//! ordinary tool.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agent_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(client: Arc<dyn LlmClient>) -> Result<()> {
//! let search = tool("search", "search the web")
//!     .param("query", ParameterSpec::new(ParameterType::String, "search terms").required())
//!     .handler(|_ctx, args| async move { Ok(args) })
//!     .build()?;
//!
//! let mut agent = Agent::builder(client)
//!     .system_prompt("You are a helpful assistant.")
//!     .tool(search)
//!     .build()?;
//!
//! let ctx = Cancellation::new();
//! let outcome = agent
//!     .execute(&ctx, vec![MessageContent::text("What's new in Rust?")])
//!     .await?;
//! if let Some(response) = outcome {
//!     println!("{}", response.joined_text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cancel;
pub mod compactor;
pub mod context;
pub mod error;
pub mod history;
pub mod plan;
pub mod planner;
pub mod registry;
pub mod session;
pub mod strategy;
pub mod subagent;
pub mod templates;
pub mod tools;

// --- Agent execution loop ---

pub use agent::{Agent, AgentBuilder, ExecuteResponse, DEFAULT_LOOP_LIMIT};

// --- Cancellation ---

pub use cancel::Cancellation;

// --- History compaction ---

pub use compactor::{CompactionOptions, Compactor};

// --- Context window utilities ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

// --- Error handling ---

pub use error::{Error, ErrorKind, Result};

// --- Canonical history model ---

pub use history::{
    History, HistoryDialect, ImageBlock, ImageDetail, Message, MessageContent, PdfBlock, Role,
    TextBlock, ToolCallBlock, ToolResponseBlock, CURRENT_HISTORY_VERSION,
};

// --- Plan / ToDo data model ---

pub use plan::{Plan, PlanState, ReflectionType, ToDo, ToDoChange, ToDoResult, ToDoStatus};

// --- Plan/Reflect executor ---

pub use planner::{PlanExecutor, PlanHooks};

// --- Tool registry & dispatcher ---

pub use registry::{Next, Registry, ToolMiddleware};

// --- Session / provider boundary ---

pub use session::{FunctionCall, FunctionResponse, LlmClient, Response, Session, SessionOptions};

// --- Strategy ---

pub use strategy::{
    DefaultStrategy, LoopState, PlanExecuteStrategy, ReActStrategy, Strategy, StrategyDecision,
};

// --- SubAgent ---

pub use subagent::{AgentFactory, SubAgent, SubAgentBuilder, SubAgentMiddleware, SubAgentNext};

// --- Tools ---

pub use tools::{
    tool, validate_arguments, ParameterSpec, ParameterType, Tool, ToolBuilder, ToolHandler,
    ToolSet, ToolSpec,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Commonly used types and functions for typical usage. Import with
/// `use agent_core::prelude::*;`.
pub mod prelude {
    pub use crate::{
        tool, Agent, AgentBuilder, Cancellation, CompactionOptions, Compactor, DefaultStrategy,
        Error, ErrorKind, ExecuteResponse, History, HistoryDialect, LlmClient, LoopState,
        Message, MessageContent, ParameterSpec, ParameterType, Plan, PlanExecuteStrategy,
        PlanExecutor, PlanHooks, ReActStrategy, Registry, Result, Role, Session, SessionOptions,
        Strategy, StrategyDecision, SubAgent, Tool, ToolBuilder, ToolSet, ToolSpec,
    };
}
