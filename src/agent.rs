//! # Agent Execution Loop
//!
//! The single canonical "generate -> dispatch tool calls -> feed responses
//! back" loop (§4.3). One `Agent` owns one `Session`, created lazily on
//! the first `execute` call and reused across later calls so the
//! conversation is continuous; per §5 an `Agent` is single-owner and not
//! thread-safe (concurrent calls into the same instance have undefined
//! ordering of session state — nothing here guards against that, by
//! design).

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::history::{History, Message, MessageContent, Role, ToolResponseBlock};
use crate::registry::{Registry, ToolMiddleware};
use crate::session::{FunctionResponse, LlmClient, Response, Session, SessionOptions};
use crate::strategy::{DefaultStrategy, LoopState, Strategy, StrategyDecision};
use crate::tools::{Tool, ToolSet};

/// Default bound on loop iterations before `Error::LoopLimitExceeded`
/// (§4.3).
pub const DEFAULT_LOOP_LIMIT: usize = 128;

/// The final artifact returned by `Agent::execute` when a strategy decides
/// to terminate the loop early. When non-`None`, it overrides further
/// iteration and both its `user_inputs` and `texts` are appended to the
/// session's history (§3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteResponse {
    pub texts: Vec<String>,
    pub user_inputs: Vec<MessageContent>,
}

impl ExecuteResponse {
    pub fn joined_text(&self) -> String {
        self.texts.join("")
    }
}

/// Builds an [`Agent`]. Required field: `client`. Everything else defaults
/// the way the spec's components default: loop limit 128, blocking
/// (non-streaming) generation, the [`DefaultStrategy`], no tools, no
/// system prompt.
pub struct AgentBuilder {
    client: Arc<dyn LlmClient>,
    system_prompt: Option<String>,
    tools: Vec<Tool>,
    tool_sets: Vec<Arc<dyn ToolSet>>,
    middleware: Vec<Arc<dyn ToolMiddleware>>,
    loop_limit: usize,
    streaming: bool,
    strategy: Box<dyn Strategy>,
}

impl AgentBuilder {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        AgentBuilder {
            client,
            system_prompt: None,
            tools: Vec::new(),
            tool_sets: Vec::new(),
            middleware: Vec::new(),
            loop_limit: DEFAULT_LOOP_LIMIT,
            streaming: false,
            strategy: Box::new(DefaultStrategy),
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn tool_set(mut self, tool_set: Arc<dyn ToolSet>) -> Self {
        self.tool_sets.push(tool_set);
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn ToolMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn loop_limit(mut self, limit: usize) -> Self {
        self.loop_limit = limit;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn build(self) -> Result<Agent> {
        if self.loop_limit == 0 {
            return Err(Error::config("loop_limit must be at least 1"));
        }
        Ok(Agent {
            client: self.client,
            system_prompt: self.system_prompt,
            tools: self.tools,
            tool_sets: self.tool_sets,
            middleware: self.middleware,
            loop_limit: self.loop_limit,
            streaming: self.streaming,
            strategy: self.strategy,
            session: None,
        })
    }
}

/// The top-level orchestrator. Owns a lazily-created `Session` and drives
/// the iterate-until-done loop, delegating next-input selection to a
/// `Strategy`.
pub struct Agent {
    client: Arc<dyn LlmClient>,
    system_prompt: Option<String>,
    tools: Vec<Tool>,
    tool_sets: Vec<Arc<dyn ToolSet>>,
    middleware: Vec<Arc<dyn ToolMiddleware>>,
    loop_limit: usize,
    streaming: bool,
    strategy: Box<dyn Strategy>,
    session: Option<Box<dyn Session>>,
}

impl Agent {
    pub fn builder(client: Arc<dyn LlmClient>) -> AgentBuilder {
        AgentBuilder::new(client)
    }

    /// Read-only access to the agent's session, `None` until the first
    /// `execute` call creates it.
    pub fn session(&self) -> Option<&dyn Session> {
        self.session.as_deref()
    }

    /// Drive the loop to completion: generate, dispatch tool calls, feed
    /// results back, repeat, until the strategy terminates, natural
    /// termination occurs (no more inputs to send), or `loop_limit` is
    /// exceeded.
    pub async fn execute(
        &mut self,
        ctx: &Cancellation,
        inputs: Vec<MessageContent>,
    ) -> Result<Option<ExecuteResponse>> {
        ctx.check()?;
        self.strategy.init(ctx, &inputs).await?;

        // The registry is rebuilt fresh every call (§5) so a strategy's
        // extra tools are always current; it is never mutated afterward.
        let mut combined_tools = self.tools.clone();
        combined_tools.extend(self.strategy.extra_tools());
        let registry = Registry::build(
            ctx,
            combined_tools,
            self.tool_sets.clone(),
            self.middleware.clone(),
        )
        .await?;
        let tool_specs = registry.specs(ctx).await?;

        if self.session.is_none() {
            let tool_names = tool_specs.iter().map(|s| s.name.clone()).collect();
            let session = self
                .client
                .new_session(
                    ctx,
                    SessionOptions {
                        system_prompt: self.system_prompt.clone(),
                        tool_names,
                        history: None,
                        response_schema: None,
                    },
                )
                .await?;
            self.session = Some(session);
        }

        let init_input = inputs.clone();
        let mut next_input = inputs;
        let mut last_response: Option<Response> = None;

        for iteration in 0..self.loop_limit {
            ctx.check()?;

            let session = self.session.as_mut().expect("session created above");
            let history_snapshot = session.history().clone();
            let decision = {
                let state = LoopState {
                    init_input: &init_input,
                    last_response: last_response.as_ref(),
                    next_input: &next_input,
                    iteration,
                    tools: &tool_specs,
                    system_prompt: self.system_prompt.as_deref(),
                    history: &history_snapshot,
                };
                self.strategy.handle(ctx, &state).await?
            };

            match decision {
                StrategyDecision::Terminate(exec_response) => {
                    let session = self.session.as_mut().expect("session created above");
                    append_execute_response(session.as_mut(), &exec_response);
                    return Ok(Some(exec_response));
                }
                StrategyDecision::Continue(inputs) => {
                    if inputs.is_empty() {
                        return Ok(None);
                    }

                    let session = self.session.as_mut().expect("session created above");
                    if self.streaming {
                        let mut rx = session.generate_stream(ctx, inputs).await?;
                        let mut accumulated = Response::default();
                        let mut dispatched = Vec::new();
                        while let Some(chunk) = rx.recv().await {
                            ctx.check()?;
                            if !chunk.function_calls.is_empty() {
                                let responses =
                                    registry.dispatch(ctx, chunk.function_calls.clone()).await;
                                dispatched.extend(responses);
                            }
                            accumulated.accumulate(chunk);
                        }
                        next_input = to_tool_response_contents(dispatched);
                        last_response = Some(accumulated);
                    } else {
                        let response = session.generate_content(ctx, inputs).await?;
                        let responses =
                            registry.dispatch(ctx, response.function_calls.clone()).await;
                        next_input = to_tool_response_contents(responses);
                        last_response = Some(response);
                    }
                }
            }
        }

        Err(Error::loop_limit_exceeded(self.loop_limit))
    }
}

/// Convert dispatched `FunctionResponse`s into the `MessageContent`s fed
/// into the model as the next turn's input (§3: tool_response content).
fn to_tool_response_contents(responses: Vec<FunctionResponse>) -> Vec<MessageContent> {
    responses
        .into_iter()
        .map(|response| {
            let is_error = response.is_error();
            let payload = if let Some(err) = &response.error {
                let mut map = Map::new();
                map.insert("error".to_string(), Value::String(err.clone()));
                map
            } else {
                response.result
            };
            MessageContent::ToolResponse(ToolResponseBlock {
                tool_call_id: response.id,
                name: response.name,
                response: payload,
                is_error,
            })
        })
        .collect()
}

fn append_execute_response(session: &mut dyn Session, exec_response: &ExecuteResponse) {
    let dialect = session.dialect();
    let mut addition = History::new(dialect);
    if !exec_response.user_inputs.is_empty() {
        addition.push(Message::new(Role::User, exec_response.user_inputs.clone()));
    }
    if !exec_response.texts.is_empty() {
        let blocks = exec_response
            .texts
            .iter()
            .map(|t| MessageContent::text(t.clone()))
            .collect();
        addition.push(Message::new(Role::Assistant, blocks));
    }
    if !addition.is_empty() {
        session.append_history(addition);
    }
}
