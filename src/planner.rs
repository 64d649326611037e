//! # Plan/Reflect Executor
//!
//! Drives a [`Plan`](crate::plan::Plan) from creation through completion:
//! a transient JSON-constrained planner session decomposes a goal into
//! todos, an executor session works each pending todo, and a reflector
//! session decides whether the plan continues, refines, expands, or
//! completes (§4.6). The plan's session is created here and is never the
//! same session as the owning `Agent`'s (§9, "Plan session independence").

use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::history::MessageContent;
use crate::plan::{
    Plan, PlanState, ReflectionType, ToDo, ToDoChange, ToDoResult, ToDoStatus, derive_reflection_type,
    render_progress_summary, todo_from_step,
};
use crate::registry::Registry;
use crate::session::{LlmClient, Session, SessionOptions};
use crate::templates::{
    ExecutorContext, EXECUTOR_TEMPLATE, PlannerContext, PLANNER_TEMPLATE, ReflectorContext,
    REFLECTOR_TEMPLATE, render,
};

#[derive(Debug, Deserialize)]
struct PlannerStep {
    description: String,
    intent: String,
}

#[derive(Debug, Deserialize)]
struct PlannerResponseJson {
    steps: Vec<PlannerStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReflectorResponseJson {
    #[serde(default)]
    should_continue: bool,
    #[serde(default)]
    updated_to_dos: Vec<ReflectorToDoPatch>,
    #[serde(default)]
    new_to_dos: Vec<PlannerStep>,
    #[serde(default)]
    completion_reason: Option<String>,
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReflectorToDoPatch {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    intent: Option<String>,
}

/// Per-iteration lifecycle callbacks fired by `execute`. Every field is
/// optional; a caller only supplies the hooks it cares about. Grounded in
/// the same "container of optional callback slots" shape the crate uses
/// for tool middleware, specialized to plan lifecycle events since §4.6
/// names four distinct hook points.
#[derive(Default)]
pub struct PlanHooks {
    pub on_todo_start: Option<Box<dyn Fn(&ToDo) + Send + Sync>>,
    pub on_todo_completed: Option<Box<dyn Fn(&ToDo) + Send + Sync>>,
    pub on_todo_updated: Option<Box<dyn Fn(&[(String, ToDoChange)]) + Send + Sync>>,
    pub on_plan_message: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub on_plan_completed: Option<Box<dyn Fn(&Plan) + Send + Sync>>,
}

/// Owns the plan's data and its independent session/tool registry link.
/// `Plan` itself (in `plan.rs`) is the pure serializable value; `PlanExecutor`
/// is the runtime wrapper that can actually create sessions and dispatch
/// tools.
pub struct PlanExecutor {
    pub plan: Plan,
    client: Arc<dyn LlmClient>,
    registry: Arc<Registry>,
    system_prompt: Option<String>,
    session: Option<Box<dyn Session>>,
}

impl PlanExecutor {
    /// `Create`: spin up a transient planner session constrained to JSON
    /// output, decompose `goal` into todos.
    pub async fn create(
        ctx: &Cancellation,
        goal: impl Into<String>,
        client: Arc<dyn LlmClient>,
        registry: Arc<Registry>,
        system_prompt: Option<String>,
    ) -> Result<PlanExecutor> {
        let goal = goal.into();
        let tool_capabilities = describe_tools(&registry, ctx).await?;
        let prompt = render(
            PLANNER_TEMPLATE,
            &PlannerContext {
                goal: goal.clone(),
                tool_capabilities,
                system_prompt: system_prompt.clone(),
            },
        )?;

        let mut planner_session = client
            .new_session(
                ctx,
                SessionOptions {
                    system_prompt: None,
                    tool_names: Vec::new(),
                    history: None,
                    response_schema: Some(planner_schema()),
                },
            )
            .await?;
        let response = planner_session
            .generate_content(ctx, vec![MessageContent::text(prompt)])
            .await?;

        let parsed: PlannerResponseJson = serde_json::from_str(&response.joined_text())
            .map_err(|e| Error::invalid_input_schema(format!("planner response: {e}")))?;

        let now = Utc::now();
        let todos: Vec<ToDo> = parsed
            .steps
            .into_iter()
            .map(|s| todo_from_step(s.description, s.intent, now))
            .collect();

        let plan = Plan::new(goal, todos);

        Ok(PlanExecutor {
            plan,
            client,
            registry,
            system_prompt,
            session: None,
        })
    }

    /// Re-attach a deserialized `Plan` to a live client/registry, the
    /// counterpart to §4.6's "runtime fields are reattached at load time."
    pub fn attach(
        plan: Plan,
        client: Arc<dyn LlmClient>,
        registry: Arc<Registry>,
        system_prompt: Option<String>,
    ) -> PlanExecutor {
        PlanExecutor {
            plan,
            client,
            registry,
            system_prompt,
            session: None,
        }
    }

    /// `Execute`: run until no pending todo remains, firing hooks at each
    /// lifecycle point. Returns the final textual response.
    pub async fn execute(&mut self, ctx: &Cancellation, hooks: &PlanHooks) -> Result<String> {
        match self.plan.state {
            PlanState::Completed | PlanState::Failed => {
                return Err(Error::plan_already_executed(format!("{:?}", self.plan.state).to_lowercase()));
            }
            PlanState::Created => self.plan.state = PlanState::Running,
            PlanState::Running => {}
        }

        if self.session.is_none() {
            let session = self
                .client
                .new_session(
                    ctx,
                    SessionOptions {
                        system_prompt: self.system_prompt.clone(),
                        tool_names: Vec::new(),
                        history: None,
                        response_schema: None,
                    },
                )
                .await?;
            self.session = Some(session);
        }

        loop {
            let Some(idx) = self.plan.first_pending_index() else {
                break;
            };

            self.plan.todos[idx].status = ToDoStatus::Executing;
            let todo_snapshot = self.plan.todos[idx].clone();
            if let Some(cb) = &hooks.on_todo_start {
                cb(&todo_snapshot);
            }

            let progress = {
                let completed: Vec<&ToDo> = self
                    .plan
                    .todos
                    .iter()
                    .filter(|t| t.status == ToDoStatus::Completed)
                    .collect();
                render_progress_summary(&completed)
            };

            let step_result = self.run_step(ctx, &todo_snapshot, &progress).await;

            match step_result {
                Ok(result) => {
                    self.plan.todos[idx].status = ToDoStatus::Completed;
                    self.plan.todos[idx].result = Some(result);
                    self.plan.todos[idx].updated_at = Utc::now();
                    if let Some(cb) = &hooks.on_todo_completed {
                        cb(&self.plan.todos[idx]);
                    }
                }
                Err(Error::ExitConversation(reason)) => {
                    self.plan.todos[idx].status = ToDoStatus::Completed;
                    self.plan.todos[idx].result = Some(ToDoResult {
                        output: reason,
                        tool_calls: Vec::new(),
                        data: None,
                        executed_at: Utc::now(),
                    });
                    self.plan.todos[idx].updated_at = Utc::now();
                    if let Some(cb) = &hooks.on_todo_completed {
                        cb(&self.plan.todos[idx]);
                    }
                }
                Err(err) => {
                    self.plan.todos[idx].status = ToDoStatus::Failed;
                    self.plan.todos[idx].error = Some(err.to_string());
                    self.plan.todos[idx].updated_at = Utc::now();
                    self.plan.state = PlanState::Failed;
                    return Err(Error::plan_step_failed(
                        self.plan.todos[idx].id.clone(),
                        self.plan.todos[idx].description.clone(),
                        err.to_string(),
                    ));
                }
            }

            let reflection = self.reflect(ctx, idx).await?;
            match reflection {
                ReflectOutcome::Continue => {}
                ReflectOutcome::Terminal(response) => {
                    self.plan.state = PlanState::Completed;
                    if let Some(cb) = &hooks.on_plan_message {
                        cb(&response);
                    }
                    if let Some(cb) = &hooks.on_plan_completed {
                        cb(&self.plan);
                    }
                    return Ok(response);
                }
                ReflectOutcome::Updated(changes) => {
                    if let Some(cb) = &hooks.on_todo_updated {
                        cb(&changes);
                    }
                }
            }
        }

        self.plan.state = PlanState::Completed;
        let response = self
            .plan
            .todos
            .last()
            .and_then(|t| t.result.as_ref())
            .map(|r| r.output.clone())
            .unwrap_or_default();
        if let Some(cb) = &hooks.on_plan_completed {
            cb(&self.plan);
        }
        Ok(response)
    }

    async fn run_step(&mut self, ctx: &Cancellation, todo: &ToDo, progress: &str) -> Result<ToDoResult> {
        let prompt = render(
            EXECUTOR_TEMPLATE,
            &ExecutorContext {
                intent: todo.intent.clone(),
                progress_summary: progress.to_string(),
            },
        )?;

        let session = self.session.as_mut().expect("session created before run_step");
        let response = session
            .generate_content(ctx, vec![MessageContent::text(prompt)])
            .await?;

        let responses = self.registry.dispatch(ctx, response.function_calls.clone()).await;
        let tool_calls = response.function_calls.clone();
        let data = if responses.is_empty() {
            None
        } else {
            Some(Value::Array(
                responses
                    .iter()
                    .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
                    .collect(),
            ))
        };

        Ok(ToDoResult {
            output: response.joined_text(),
            tool_calls,
            data,
            executed_at: Utc::now(),
        })
    }

    async fn reflect(&mut self, ctx: &Cancellation, just_completed_idx: usize) -> Result<ReflectOutcome> {
        let completed: Vec<&ToDo> = self
            .plan
            .todos
            .iter()
            .filter(|t| t.status == ToDoStatus::Completed)
            .collect();
        let completed_summary = render_progress_summary(&completed);
        let plan_summary = self
            .plan
            .todos
            .iter()
            .map(|t| format!("- [{:?}] {}", t.status, t.description))
            .collect::<Vec<_>>()
            .join("\n");
        let last_output = self.plan.todos[just_completed_idx]
            .result
            .as_ref()
            .map(|r| r.output.clone())
            .unwrap_or_default();

        let prompt = render(
            REFLECTOR_TEMPLATE,
            &ReflectorContext {
                goal: self.plan.input.clone(),
                plan_summary,
                completed_steps_summary: completed_summary,
                last_step_output: last_output,
            },
        )?;

        let mut reflector_session = self
            .client
            .new_session(
                ctx,
                SessionOptions {
                    system_prompt: None,
                    tool_names: Vec::new(),
                    history: None,
                    response_schema: Some(reflector_schema()),
                },
            )
            .await?;
        let response = reflector_session
            .generate_content(ctx, vec![MessageContent::text(prompt)])
            .await?;

        let parsed: ReflectorResponseJson = serde_json::from_str(&response.joined_text())
            .map_err(|e| Error::invalid_input_schema(format!("reflector response: {e}")))?;

        if !parsed.should_continue {
            let reflection_type = derive_reflection_type(
                !parsed.updated_to_dos.is_empty(),
                !parsed.new_to_dos.is_empty(),
                true,
            );
            debug!("plan reflection: {reflection_type:?}, completing");
            let text = parsed
                .response
                .or(parsed.completion_reason)
                .unwrap_or_default();
            return Ok(ReflectOutcome::Terminal(text));
        }

        let mut changes = Vec::new();
        for patch in parsed.updated_to_dos {
            if let Some(todo) = self.plan.todos.iter_mut().find(|t| t.id == patch.id) {
                if todo.is_terminal() {
                    warn!("reflection attempted to patch terminal todo {}", patch.id);
                    continue;
                }
                if let Some(description) = patch.description {
                    todo.description = description;
                }
                if let Some(intent) = patch.intent {
                    todo.intent = intent;
                }
                todo.updated_at = Utc::now();
                changes.push((todo.id.clone(), ToDoChange::Updated));
            }
        }
        let now = Utc::now();
        for step in parsed.new_to_dos {
            let todo = todo_from_step(step.description, step.intent, now);
            changes.push((todo.id.clone(), ToDoChange::Added));
            self.plan.todos.push(todo);
        }

        let reflection_type = derive_reflection_type(
            changes.iter().any(|(_, c)| *c == ToDoChange::Updated),
            changes.iter().any(|(_, c)| *c == ToDoChange::Added),
            false,
        );
        debug!("plan reflection: {reflection_type:?}");

        if changes.is_empty() {
            Ok(ReflectOutcome::Continue)
        } else {
            Ok(ReflectOutcome::Updated(changes))
        }
    }
}

enum ReflectOutcome {
    Continue,
    Updated(Vec<(String, ToDoChange)>),
    Terminal(String),
}

async fn describe_tools(registry: &Registry, ctx: &Cancellation) -> Result<String> {
    let specs = registry.specs(ctx).await?;
    if specs.is_empty() {
        return Ok("(no tools available)".to_string());
    }
    Ok(specs
        .iter()
        .map(|s| format!("- {}: {}", s.name, s.description))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn planner_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "description": { "type": "string" },
                        "intent": { "type": "string" }
                    },
                    "required": ["description", "intent"]
                }
            }
        },
        "required": ["steps"]
    })
}

fn reflector_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "shouldContinue": { "type": "boolean" },
            "updatedToDos": { "type": "array" },
            "newToDos": { "type": "array" },
            "completionReason": { "type": "string" },
            "response": { "type": "string" }
        },
        "required": ["shouldContinue"]
    })
}
