//! # Prompt Template Rendering
//!
//! Every LLM-facing prompt that isn't raw user input — the compactor's
//! summarizer prompt, the planner/executor/reflector prompts, the
//! SubAgent's templated user prompt — is a `&'static str` `handlebars`
//! template plus a small `#[derive(Serialize)]` context struct. Rendering
//! is deterministic and side-effect free (§9, "Template rendering"); a
//! rendering failure fails the calling operation immediately rather than
//! falling back to an ad-hoc format.

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::Result;

/// Render `template` against `context`. A fresh registry per call keeps
/// this function pure and avoids the complexity of a shared, lazily
/// initialized global registry for what are small, cheap-to-compile
/// templates.
pub fn render(template: &str, context: &impl Serialize) -> Result<String> {
    let mut handlebars = Handlebars::new();
    // `missingkey=zero`-equivalent: a missing key renders as an empty
    // string rather than failing the render, matching the SubAgent's
    // "missing optional values substitute type-appropriate zero values"
    // contract (the zero-value substitution itself happens on the args map
    // before rendering; this just keeps an unexpectedly-absent key from
    // turning into a hard error).
    handlebars.set_strict_mode(false);
    Ok(handlebars.render_template(template, context)?)
}

/// Context for [`SUMMARIZER_TEMPLATE`].
#[derive(Debug, Serialize)]
pub struct SummarizerContext {
    pub conversation: String,
}

pub const SUMMARIZER_TEMPLATE: &str = "\
You are compacting a conversation history. Summarize the exchange below \
concisely, preserving every concrete decision, name, number, and fact a \
reader would need to continue the conversation without the original text.

{{conversation}}

Respond with the summary only, no preamble.";

/// Context for [`PLANNER_TEMPLATE`].
#[derive(Debug, Serialize)]
pub struct PlannerContext {
    pub goal: String,
    pub tool_capabilities: String,
    pub system_prompt: Option<String>,
}

pub const PLANNER_TEMPLATE: &str = "\
{{#if system_prompt}}{{system_prompt}}

{{/if}}You are decomposing a goal into an ordered list of todos.

GOAL: {{goal}}

AVAILABLE TOOLS:
{{tool_capabilities}}

Respond with JSON only, matching: {\"steps\": [{\"description\": \"...\", \"intent\": \"...\"}]}";

/// Context for [`EXECUTOR_TEMPLATE`].
#[derive(Debug, Serialize)]
pub struct ExecutorContext {
    pub intent: String,
    pub progress_summary: String,
}

pub const EXECUTOR_TEMPLATE: &str = "\
PROGRESS SO FAR:
{{progress_summary}}

CURRENT STEP INTENT: {{intent}}

Carry out this step. Use tools if they help; otherwise respond directly.";

/// Context for [`REFLECTOR_TEMPLATE`].
#[derive(Debug, Serialize)]
pub struct ReflectorContext {
    pub goal: String,
    pub plan_summary: String,
    pub completed_steps_summary: String,
    pub last_step_output: String,
}

pub const REFLECTOR_TEMPLATE: &str = "\
GOAL: {{goal}}

PLAN SO FAR:
{{plan_summary}}

COMPLETED STEPS:
{{completed_steps_summary}}

LAST STEP OUTPUT:
{{last_step_output}}

Decide whether the plan should continue. Respond with JSON only, matching: \
{\"shouldContinue\": bool, \"updatedToDos\": [...], \"newToDos\": [...], \
\"completionReason\": \"...\", \"response\": \"...\"}";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarizer_template_renders_conversation() {
        let context = SummarizerContext {
            conversation: "user: hi\nassistant: hello".to_string(),
        };
        let rendered = render(SUMMARIZER_TEMPLATE, &context).unwrap();
        assert!(rendered.contains("user: hi"));
    }

    #[test]
    fn planner_template_omits_system_block_when_absent() {
        let context = PlannerContext {
            goal: "list three prime numbers".to_string(),
            tool_capabilities: "(none)".to_string(),
            system_prompt: None,
        };
        let rendered = render(PLANNER_TEMPLATE, &context).unwrap();
        assert!(rendered.starts_with("You are decomposing"));
    }

    #[test]
    fn planner_template_includes_system_block_when_present() {
        let context = PlannerContext {
            goal: "list three prime numbers".to_string(),
            tool_capabilities: "(none)".to_string(),
            system_prompt: Some("be terse".to_string()),
        };
        let rendered = render(PLANNER_TEMPLATE, &context).unwrap();
        assert!(rendered.starts_with("be terse"));
    }
}
