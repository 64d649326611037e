//! # Plan / ToDo Data Model
//!
//! The types `planner.rs` operates on. Kept separate from the planner logic
//! itself so the serialized shape (`{version, id, input, todos, state}`, per
//! §6.4) is easy to eyeball independent of the create/execute/reflect flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::session::FunctionCall;

pub const CURRENT_PLAN_VERSION: u32 = 1;

/// A single todo's lifecycle. `Executing` never appears in a serialized
/// plan (a plan is only ever written out between steps), but is a real
/// value of `ToDoStatus` while `Plan::execute` is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToDoStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Skipped,
}

/// The result recorded on a todo once its executor step completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToDoResult {
    pub output: String,
    #[serde(rename = "toolCalls", default)]
    pub tool_calls: Vec<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "executedAt")]
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToDo {
    pub id: String,
    pub description: String,
    pub intent: String,
    pub status: ToDoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToDoResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl ToDo {
    pub fn new(description: impl Into<String>, intent: impl Into<String>, now: DateTime<Utc>) -> Self {
        ToDo {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            intent: intent.into(),
            status: ToDoStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ToDoStatus::Completed | ToDoStatus::Failed | ToDoStatus::Skipped
        )
    }
}

/// The state machine §4.6 describes: `created -> running -> {completed |
/// failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanState {
    Created,
    Running,
    Completed,
    Failed,
}

/// How a reflection pass changed the todo list, derived purely from the
/// before/after diff (§4.6, "Reflection type is derived from the change
/// set").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionType {
    Continue,
    Refine,
    Expand,
    RefinedDone,
    Complete,
}

/// Per-todo change record accompanying a `planToDoUpdated` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToDoChange {
    Updated,
    Added,
    Removed,
}

/// Derive the reflection type from whether the todo list had entries
/// updated and/or added, and whether the reflection completed the plan.
/// A pure function, independently unit-testable from the rest of the
/// executor.
pub fn derive_reflection_type(updated_any: bool, added_any: bool, completing: bool) -> ReflectionType {
    match (completing, updated_any || added_any) {
        (true, false) => ReflectionType::Complete,
        (true, true) => ReflectionType::RefinedDone,
        (false, _) if added_any => ReflectionType::Expand,
        (false, true) => ReflectionType::Refine,
        (false, false) => ReflectionType::Continue,
    }
}

/// Only the fields in §6.4's persisted shape round-trip; `input` is the
/// original goal prompt used to re-derive session context on `attach`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub version: u32,
    pub id: String,
    pub input: String,
    pub todos: Vec<ToDo>,
    pub state: PlanState,
}

impl Plan {
    pub fn new(input: impl Into<String>, todos: Vec<ToDo>) -> Self {
        Plan {
            version: CURRENT_PLAN_VERSION,
            id: Uuid::new_v4().to_string(),
            input: input.into(),
            todos,
            state: PlanState::Created,
        }
    }

    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let mut completed = 0;
        let mut pending = 0;
        let mut failed = 0;
        let mut skipped = 0;
        for todo in &self.todos {
            match todo.status {
                ToDoStatus::Completed => completed += 1,
                ToDoStatus::Pending | ToDoStatus::Executing => pending += 1,
                ToDoStatus::Failed => failed += 1,
                ToDoStatus::Skipped => skipped += 1,
            }
        }
        (completed, pending, failed, skipped)
    }

    pub fn first_pending_index(&self) -> Option<usize> {
        self.todos.iter().position(|t| t.status == ToDoStatus::Pending)
    }
}

/// Normalize a planner response step into a fresh `ToDo`. Exposed so
/// `planner.rs` can stay focused on session/prompt orchestration.
pub fn todo_from_step(description: String, intent: String, now: DateTime<Utc>) -> ToDo {
    ToDo::new(description, intent, now)
}

/// Build the argument map fed into the executor's tool dispatch summary
/// used by `planner.rs` when rendering progress so far. Kept here as a
/// small free function rather than inline string formatting scattered
/// across the executor so tests can exercise it directly.
pub fn render_progress_summary(completed: &[&ToDo]) -> String {
    if completed.is_empty() {
        return "(no steps completed yet)".to_string();
    }
    completed
        .iter()
        .map(|t| {
            let output = t
                .result
                .as_ref()
                .map(|r| r.output.as_str())
                .unwrap_or("(no output)");
            format!("- {}: {}", t.description, output)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
