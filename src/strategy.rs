//! # Strategy — pluggable next-input decision policy
//!
//! The agent loop in [`crate::agent`] delegates "what goes into the model
//! next" to a `Strategy` on every iteration (§4.4). The default strategy
//! forwards whatever the dispatcher produced from the previous turn's tool
//! calls verbatim and never terminates early; specialized strategies
//! re-shape the next input or synthesize a terminal [`ExecuteResponse`].
//!
//! The spec's `Handle(state) -> (inputs, executeResponse)` is modeled here
//! as a two-variant enum rather than a pair of nullable return values —
//! `StrategyDecision::Terminate` and `StrategyDecision::Continue` are
//! mutually exclusive by construction, so there's no "inputs present but
//! ignored because executeResponse was also set" case to warn about at
//! every call site.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::ExecuteResponse;
use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::history::{History, MessageContent};
use crate::planner::{PlanExecutor, PlanHooks};
use crate::registry::Registry;
use crate::session::{LlmClient, Response};
use crate::tools::{Tool, ToolSpec};

/// A read-only snapshot of the agent loop's state, handed to
/// `Strategy::handle` on every iteration. Mirrors the `state` record in the
/// spec's loop pseudocode exactly: `session` is represented here as
/// `history` (the one part of the session a strategy is expected to read).
pub struct LoopState<'a> {
    pub init_input: &'a [MessageContent],
    pub last_response: Option<&'a Response>,
    pub next_input: &'a [MessageContent],
    pub iteration: usize,
    pub tools: &'a [ToolSpec],
    pub system_prompt: Option<&'a str>,
    pub history: &'a History,
}

/// What a strategy wants to happen next.
pub enum StrategyDecision {
    /// Feed `inputs` into the model this turn. An empty vector is natural
    /// termination: the loop returns `Ok(None)` without ever calling
    /// `GenerateContent` again.
    Continue(Vec<MessageContent>),
    /// End the loop now with a final response, bypassing the model
    /// entirely for this iteration.
    Terminate(ExecuteResponse),
}

/// Polymorphic decision object producing the next turn's inputs, or
/// terminating the loop with a final response (§4.4).
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Called once per `Agent::execute` before the loop begins. The
    /// default implementation does nothing; a strategy that needs to
    /// stand up its own state (a planner session, a scratch buffer)
    /// overrides this.
    async fn init(&mut self, ctx: &Cancellation, initial_inputs: &[MessageContent]) -> Result<()> {
        let _ = (ctx, initial_inputs);
        Ok(())
    }

    /// Extra tools this strategy publishes into the shared tool namespace,
    /// in addition to the agent's own static tools/tool sets. Collisions
    /// with an existing name fail registry build the same way any other
    /// duplicate tool name would (§4.4: "Strategy tool names share the
    /// tool namespace; collisions fail").
    fn extra_tools(&self) -> Vec<Tool> {
        Vec::new()
    }

    async fn handle(&mut self, ctx: &Cancellation, state: &LoopState<'_>) -> Result<StrategyDecision>;
}

/// Forwards `state.next_input` verbatim every call and never terminates
/// early — termination is purely a function of the dispatcher producing no
/// further tool responses to feed back.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultStrategy;

#[async_trait]
impl Strategy for DefaultStrategy {
    async fn handle(&mut self, _ctx: &Cancellation, state: &LoopState<'_>) -> Result<StrategyDecision> {
        Ok(StrategyDecision::Continue(state.next_input.to_vec()))
    }
}

/// A ReAct-flavored strategy: on the first iteration it prefixes the
/// user's input with a reasoning preamble; on every later iteration it
/// inspects the accumulated text of the previous response for a
/// `final_marker` (default `"Final Answer:"`) and, if found, terminates
/// the loop with everything after the marker as the final response instead
/// of forwarding tool responses for another round.
pub struct ReActStrategy {
    final_marker: String,
}

impl ReActStrategy {
    pub fn new() -> Self {
        ReActStrategy {
            final_marker: "Final Answer:".to_string(),
        }
    }

    pub fn with_final_marker(mut self, marker: impl Into<String>) -> Self {
        self.final_marker = marker.into();
        self
    }
}

impl Default for ReActStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for ReActStrategy {
    async fn handle(&mut self, _ctx: &Cancellation, state: &LoopState<'_>) -> Result<StrategyDecision> {
        if let Some(response) = state.last_response {
            let joined = response.joined_text();
            if let Some(idx) = joined.find(&self.final_marker) {
                let answer = joined[idx + self.final_marker.len()..].trim().to_string();
                return Ok(StrategyDecision::Terminate(ExecuteResponse {
                    texts: vec![answer],
                    user_inputs: state.init_input.to_vec(),
                }));
            }
        }
        if state.iteration == 0 {
            let mut prefixed = Vec::with_capacity(state.next_input.len() + 1);
            prefixed.push(MessageContent::text(
                "Think step by step. When you have the answer, prefix it with \"Final Answer:\".",
            ));
            prefixed.extend(state.next_input.iter().cloned());
            return Ok(StrategyDecision::Continue(prefixed));
        }
        Ok(StrategyDecision::Continue(state.next_input.to_vec()))
    }
}

/// Adapts the [`PlanExecutor`] as an `Agent` strategy: the first call to
/// `handle` decomposes the initial inputs into a plan (via `init`) and
/// drives it to completion, then terminates the agent loop with the
/// plan's final response. The plan's session is created by `PlanExecutor`
/// itself and is never the Agent's own session (§9, "Plan session
/// independence").
pub struct PlanExecuteStrategy {
    client: Arc<dyn LlmClient>,
    registry: Arc<Registry>,
    system_prompt: Option<String>,
    executor: Option<PlanExecutor>,
}

impl PlanExecuteStrategy {
    pub fn new(client: Arc<dyn LlmClient>, registry: Arc<Registry>, system_prompt: Option<String>) -> Self {
        PlanExecuteStrategy {
            client,
            registry,
            system_prompt,
            executor: None,
        }
    }
}

#[async_trait]
impl Strategy for PlanExecuteStrategy {
    async fn init(&mut self, ctx: &Cancellation, initial_inputs: &[MessageContent]) -> Result<()> {
        let goal = initial_inputs
            .iter()
            .filter_map(MessageContent::as_text)
            .collect::<Vec<_>>()
            .join("\n");
        let executor = PlanExecutor::create(
            ctx,
            goal,
            self.client.clone(),
            self.registry.clone(),
            self.system_prompt.clone(),
        )
        .await?;
        self.executor = Some(executor);
        Ok(())
    }

    async fn handle(&mut self, ctx: &Cancellation, state: &LoopState<'_>) -> Result<StrategyDecision> {
        if state.iteration > 0 {
            // The plan already ran to completion on iteration 0; a second
            // call means the loop re-entered after termination, which
            // shouldn't happen, but natural-terminate rather than re-run
            // the plan.
            return Ok(StrategyDecision::Continue(Vec::new()));
        }
        let executor = self
            .executor
            .as_mut()
            .ok_or_else(|| Error::plan_not_initialized("PlanExecuteStrategy::init was not called"))?;
        let hooks = PlanHooks::default();
        let response = executor.execute(ctx, &hooks).await?;
        Ok(StrategyDecision::Terminate(ExecuteResponse {
            texts: vec![response],
            user_inputs: state.init_input.to_vec(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryDialect;

    fn empty_history() -> History {
        History::new(HistoryDialect::OpenAi)
    }

    #[tokio::test]
    async fn default_strategy_forwards_next_input_verbatim() {
        let ctx = Cancellation::new();
        let history = empty_history();
        let next_input = vec![MessageContent::text("tool response")];
        let state = LoopState {
            init_input: &[],
            last_response: None,
            next_input: &next_input,
            iteration: 1,
            tools: &[],
            system_prompt: None,
            history: &history,
        };
        let mut strategy = DefaultStrategy;
        match strategy.handle(&ctx, &state).await.unwrap() {
            StrategyDecision::Continue(inputs) => assert_eq!(inputs, next_input),
            StrategyDecision::Terminate(_) => panic!("default strategy should never terminate"),
        }
    }

    #[tokio::test]
    async fn default_strategy_empty_next_input_is_natural_termination_signal() {
        let ctx = Cancellation::new();
        let history = empty_history();
        let state = LoopState {
            init_input: &[],
            last_response: None,
            next_input: &[],
            iteration: 2,
            tools: &[],
            system_prompt: None,
            history: &history,
        };
        let mut strategy = DefaultStrategy;
        match strategy.handle(&ctx, &state).await.unwrap() {
            StrategyDecision::Continue(inputs) => assert!(inputs.is_empty()),
            StrategyDecision::Terminate(_) => panic!("default strategy should never terminate"),
        }
    }

    #[tokio::test]
    async fn react_strategy_terminates_on_final_marker() {
        let ctx = Cancellation::new();
        let history = empty_history();
        let response = Response {
            texts: vec!["Reasoning... Final Answer: 42".to_string()],
            ..Default::default()
        };
        let init_input = vec![MessageContent::text("what is the answer?")];
        let state = LoopState {
            init_input: &init_input,
            last_response: Some(&response),
            next_input: &[],
            iteration: 1,
            tools: &[],
            system_prompt: None,
            history: &history,
        };
        let mut strategy = ReActStrategy::new();
        match strategy.handle(&ctx, &state).await.unwrap() {
            StrategyDecision::Terminate(resp) => assert_eq!(resp.texts, vec!["42".to_string()]),
            StrategyDecision::Continue(_) => panic!("expected termination on final marker"),
        }
    }

    #[tokio::test]
    async fn react_strategy_adds_preamble_on_first_iteration() {
        let ctx = Cancellation::new();
        let history = empty_history();
        let next_input = vec![MessageContent::text("hello")];
        let state = LoopState {
            init_input: &next_input,
            last_response: None,
            next_input: &next_input,
            iteration: 0,
            tools: &[],
            system_prompt: None,
            history: &history,
        };
        let mut strategy = ReActStrategy::new();
        match strategy.handle(&ctx, &state).await.unwrap() {
            StrategyDecision::Continue(inputs) => {
                assert_eq!(inputs.len(), 2);
                assert!(inputs[0].as_text().unwrap().contains("step by step"));
            }
            StrategyDecision::Terminate(_) => panic!("should not terminate with no prior response"),
        }
    }
}
