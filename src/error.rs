//! # Error Types for the Agent Core
//!
//! This module defines all error types used throughout the crate, providing
//! comprehensive error handling with detailed context for different failure
//! scenarios.
//!
//! ## Design Philosophy
//!
//! - **Explicit Error Handling**: uses Rust's `Result<T>` for all fallible operations.
//! - **No Silent Failures**: every error is propagated explicitly to the caller.
//! - **Sentinel Taxonomy**: every error carries an [`ErrorKind`] so callers can
//!   branch on the *kind* of failure without string comparison, in addition to a
//!   human-readable message and (for the richer variants) structured context.
//! - **Easy Conversion**: automatic conversion from `serde_json::Error` and
//!   `handlebars::RenderError`.
//!
//! ## Usage
//!
//! ```
//! use agent_core::{Error, Result};
//!
//! fn example() -> Result<()> {
//!     if false {
//!         return Err(Error::config("invalid model name"));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error as ThisError;

use crate::history::HistoryDialect;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// Type alias for `Result<T, Error>` used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// SENTINEL TAXONOMY
// ============================================================================

/// The control-plane sentinel a caller can match on, independent of the
/// human-readable message carried by [`Error`].
///
/// This is the Rust rendering of the flat sentinel list in the
/// specification's external-interfaces section: one tag per failure
/// category that a caller is expected to branch on (retry, abort, surface
/// to the model, refuse to start).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidTool,
    InvalidParameter,
    ToolNameConflict,
    LoopLimitExceeded,
    InvalidInputSchema,
    InvalidHistoryData,
    LlmTypeMismatch,
    HistoryVersionMismatch,
    ExitConversation,
    PlanAlreadyExecuted,
    PlanNotInitialized,
    PlanStepFailed,
    TokenSizeExceeded,
    FunctionCallFormat,
    ProhibitedContent,
    ToolArgsValidation,
    SubAgentFactory,
    Cancelled,
    Json,
    Template,
    Other,
}

// ============================================================================
// ERROR ENUM
// ============================================================================

/// Comprehensive error type covering all failure modes in the crate.
///
/// Built with `thiserror` for `std::error::Error` + `Display`. Each variant
/// maps to exactly one [`ErrorKind`] via [`Error::kind`]; the richer
/// variants (loop limit, plan step failure, history dialect mismatch) carry
/// structured fields rather than a bare string so the context the spec asks
/// for ("loop_limit=3 recorded") is a typed field, not a substring to parse.
#[derive(ThisError, Debug)]
pub enum Error {
    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Prompt template rendering failed (planner/executor/reflector/summarizer).
    #[error("template rendering failed: {0}")]
    Template(#[from] handlebars::RenderError),

    /// Invalid configuration provided when building `AgentOptions` or similar.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A `Tool` or `ToolSet`-provided spec is malformed (bad name, missing
    /// handler, invalid parameter spec).
    #[error("invalid tool: {0}")]
    InvalidTool(String),

    /// A declared tool parameter is invalid (unknown type, conflicting
    /// constraints, duplicate name).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Two tools (static or set-provided) registered under the same name.
    #[error("tool name conflict: '{name}' is already registered")]
    ToolNameConflict { name: String },

    /// The agent loop ran `loop_limit` iterations without reaching a
    /// natural termination or a strategy-issued `ExecuteResponse`.
    #[error("loop limit exceeded after {loop_limit} iterations")]
    LoopLimitExceeded { loop_limit: usize },

    /// A tool's declared parameter schema could not be interpreted.
    #[error("invalid input schema: {0}")]
    InvalidInputSchema(String),

    /// A `History`/`Message`/`MessageContent` value failed to parse: unknown
    /// content type, dangling tool-response reference, malformed payload.
    #[error("invalid history data: {0}")]
    InvalidHistoryData(String),

    /// A history tagged for one dialect was requested in another.
    #[error("history tagged for {actual:?} was requested as {requested:?}")]
    LlmTypeMismatch {
        requested: HistoryDialect,
        actual: HistoryDialect,
    },

    /// A persisted `History`'s schema version does not match the crate's
    /// current schema version.
    #[error("history schema version mismatch: expected {expected}, found {found}")]
    HistoryVersionMismatch { expected: u32, found: u32 },

    /// A tool signaled that the conversation should end cleanly. This is
    /// session-terminal but plan-tolerant: the plan executor treats it as
    /// "goal reached," not a failure.
    #[error("conversation exited by tool: {0}")]
    ExitConversation(String),

    /// `Plan::execute` was called on a plan already in `Completed` or `Failed`.
    #[error("plan already executed (state={state})")]
    PlanAlreadyExecuted { state: String },

    /// `Plan::execute` was called before the plan's session/tool map/agent
    /// link was established (e.g. after a bare deserialize with no
    /// `attach`).
    #[error("plan not initialized: {0}")]
    PlanNotInitialized(String),

    /// A single todo's execution step failed unrecoverably.
    #[error("plan step {step_id} ('{description}') failed: {reason}")]
    PlanStepFailed {
        step_id: String,
        description: String,
        reason: String,
    },

    /// Estimated or provider-reported token count exceeded a hard budget.
    #[error("token size exceeded: {0}")]
    TokenSizeExceeded(String),

    /// A model-emitted function call could not be parsed into a
    /// `FunctionCall` (malformed id/name/arguments).
    #[error("malformed function call: {0}")]
    FunctionCallFormat(String),

    /// Content was rejected by a provider or middleware as prohibited.
    #[error("prohibited content: {0}")]
    ProhibitedContent(String),

    /// Tool call arguments failed structural or semantic validation; the
    /// tool's `Run` was never invoked.
    #[error("tool argument validation failed: {0}")]
    ToolArgsValidation(String),

    /// A `SubAgent`'s inner-agent factory returned `None` or an error.
    #[error("sub-agent factory failed: {0}")]
    SubAgentFactory(String),

    /// A caller-supplied `Cancellation` was triggered; returned at the next
    /// suspension point as required by the concurrency model. Not part of
    /// the spec's named sentinel taxonomy (the core has no cancellation
    /// context of its own to originate one from) but needed once a local
    /// `Cancellation` handle is threaded through every entry point.
    #[error("operation cancelled")]
    Cancelled,

    /// Catch-all for conditions that don't fit the categories above.
    /// Used sparingly.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The sentinel this error belongs to, for callers that want to branch
    /// on error kind rather than match the full enum or parse `Display`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Json(_) => ErrorKind::Json,
            Error::Template(_) => ErrorKind::Template,
            Error::Config(_) => ErrorKind::Other,
            Error::InvalidTool(_) => ErrorKind::InvalidTool,
            Error::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Error::ToolNameConflict { .. } => ErrorKind::ToolNameConflict,
            Error::LoopLimitExceeded { .. } => ErrorKind::LoopLimitExceeded,
            Error::InvalidInputSchema(_) => ErrorKind::InvalidInputSchema,
            Error::InvalidHistoryData(_) => ErrorKind::InvalidHistoryData,
            Error::LlmTypeMismatch { .. } => ErrorKind::LlmTypeMismatch,
            Error::HistoryVersionMismatch { .. } => ErrorKind::HistoryVersionMismatch,
            Error::ExitConversation(_) => ErrorKind::ExitConversation,
            Error::PlanAlreadyExecuted { .. } => ErrorKind::PlanAlreadyExecuted,
            Error::PlanNotInitialized(_) => ErrorKind::PlanNotInitialized,
            Error::PlanStepFailed { .. } => ErrorKind::PlanStepFailed,
            Error::TokenSizeExceeded(_) => ErrorKind::TokenSizeExceeded,
            Error::FunctionCallFormat(_) => ErrorKind::FunctionCallFormat,
            Error::ProhibitedContent(_) => ErrorKind::ProhibitedContent,
            Error::ToolArgsValidation(_) => ErrorKind::ToolArgsValidation,
            Error::SubAgentFactory(_) => ErrorKind::SubAgentFactory,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Other(_) => ErrorKind::Other,
        }
    }
}

// ============================================================================
// CONVENIENCE CONSTRUCTORS
// ============================================================================

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn invalid_tool(msg: impl Into<String>) -> Self {
        Error::InvalidTool(msg.into())
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    pub fn tool_name_conflict(name: impl Into<String>) -> Self {
        Error::ToolNameConflict { name: name.into() }
    }

    pub fn loop_limit_exceeded(loop_limit: usize) -> Self {
        Error::LoopLimitExceeded { loop_limit }
    }

    pub fn invalid_input_schema(msg: impl Into<String>) -> Self {
        Error::InvalidInputSchema(msg.into())
    }

    pub fn invalid_history_data(msg: impl Into<String>) -> Self {
        Error::InvalidHistoryData(msg.into())
    }

    pub fn llm_type_mismatch(requested: HistoryDialect, actual: HistoryDialect) -> Self {
        Error::LlmTypeMismatch { requested, actual }
    }

    pub fn history_version_mismatch(expected: u32, found: u32) -> Self {
        Error::HistoryVersionMismatch { expected, found }
    }

    pub fn exit_conversation(msg: impl Into<String>) -> Self {
        Error::ExitConversation(msg.into())
    }

    pub fn plan_already_executed(state: impl Into<String>) -> Self {
        Error::PlanAlreadyExecuted { state: state.into() }
    }

    pub fn plan_not_initialized(msg: impl Into<String>) -> Self {
        Error::PlanNotInitialized(msg.into())
    }

    pub fn plan_step_failed(
        step_id: impl Into<String>,
        description: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::PlanStepFailed {
            step_id: step_id.into(),
            description: description.into(),
            reason: reason.into(),
        }
    }

    pub fn token_size_exceeded(msg: impl Into<String>) -> Self {
        Error::TokenSizeExceeded(msg.into())
    }

    pub fn function_call_format(msg: impl Into<String>) -> Self {
        Error::FunctionCallFormat(msg.into())
    }

    pub fn prohibited_content(msg: impl Into<String>) -> Self {
        Error::ProhibitedContent(msg.into())
    }

    pub fn tool_args_validation(msg: impl Into<String>) -> Self {
        Error::ToolArgsValidation(msg.into())
    }

    pub fn sub_agent_factory(msg: impl Into<String>) -> Self {
        Error::SubAgentFactory(msg.into())
    }

    pub fn cancelled() -> Self {
        Error::Cancelled
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("invalid model");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.to_string(), "invalid configuration: invalid model");
    }

    #[test]
    fn test_error_tool_name_conflict_kind() {
        let err = Error::tool_name_conflict("search");
        assert_eq!(err.kind(), ErrorKind::ToolNameConflict);
        assert_eq!(
            err.to_string(),
            "tool name conflict: 'search' is already registered"
        );
    }

    #[test]
    fn test_error_loop_limit_carries_context() {
        let err = Error::loop_limit_exceeded(3);
        assert_eq!(err.kind(), ErrorKind::LoopLimitExceeded);
        match err {
            Error::LoopLimitExceeded { loop_limit } => assert_eq!(loop_limit, 3),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_error_plan_step_failed_carries_step_id() {
        let err = Error::plan_step_failed("step-1", "do the thing", "boom");
        match &err {
            Error::PlanStepFailed { step_id, .. } => assert_eq!(step_id, "step-1"),
            _ => panic!("wrong variant"),
        }
        assert_eq!(err.kind(), ErrorKind::PlanStepFailed);
    }

    #[test]
    fn test_error_llm_type_mismatch() {
        let err = Error::llm_type_mismatch(HistoryDialect::Claude, HistoryDialect::OpenAi);
        assert_eq!(err.kind(), ErrorKind::LlmTypeMismatch);
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
        assert_eq!(err.kind(), ErrorKind::Json);
    }

    #[test]
    fn test_error_cancelled_kind() {
        let err = Error::cancelled();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_result_type_alias() {
        fn _returns_result() -> Result<i32> {
            Ok(42)
        }

        fn _returns_error() -> Result<i32> {
            Err(Error::other("boom"))
        }
    }
}
