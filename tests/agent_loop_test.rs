//! Cross-module integration tests: the agent loop wired to a real
//! `Registry`, a `SubAgent` wired as an ordinary tool, and the full
//! OpenAI -> JSON -> Claude -> canonical -> OpenAI round trip. Unit-level
//! coverage for each individual module lives in that module's own
//! `#[cfg(test)]` block; these tests exercise the seams between modules.

use std::sync::{Arc, Mutex};

use agent_core::history::claude::{from_claude, to_claude};
use agent_core::history::openai::{from_openai, to_openai, OpenAiMessage};
use agent_core::prelude::*;
use agent_core::{AgentFactory, FunctionCall, ParameterSpec, ParameterType};
use async_trait::async_trait;
use serde_json::{Map, Value};

struct ScriptedSession {
    dialect: HistoryDialect,
    history: History,
    replies: Mutex<Vec<Response>>,
}

#[async_trait]
impl Session for ScriptedSession {
    fn dialect(&self) -> HistoryDialect {
        self.dialect
    }

    async fn generate_content(
        &mut self,
        _ctx: &Cancellation,
        _inputs: Vec<MessageContent>,
    ) -> Result<Response> {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            Ok(Response::default())
        } else {
            Ok(replies.remove(0))
        }
    }

    async fn generate_stream(
        &mut self,
        _ctx: &Cancellation,
        _inputs: Vec<MessageContent>,
    ) -> Result<tokio::sync::mpsc::Receiver<Response>> {
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        Ok(rx)
    }

    fn history(&self) -> &History {
        &self.history
    }

    fn append_history(&mut self, history: History) {
        self.history.append(history);
    }
}

struct ScriptedClient {
    replies: Mutex<Vec<Response>>,
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn new_session(
        &self,
        _ctx: &Cancellation,
        _options: SessionOptions,
    ) -> Result<Box<dyn Session>> {
        Ok(Box::new(ScriptedSession {
            dialect: HistoryDialect::OpenAi,
            history: History::new(HistoryDialect::OpenAi),
            replies: Mutex::new(std::mem::take(&mut self.replies.lock().unwrap())),
        }))
    }

    async fn generate_embedding(
        &self,
        _ctx: &Cancellation,
        _dim: usize,
        _inputs: &[String],
    ) -> Result<Vec<Vec<f64>>> {
        Ok(vec![])
    }

    async fn count_tokens(&self, _ctx: &Cancellation, _history: &History) -> Result<u64> {
        Ok(0)
    }
}

/// A real `Tool` backed by a registered handler, dispatched through a real
/// `Registry` inside a real `Agent::execute` call — not a test double for
/// the registry itself.
fn weather_tool() -> Tool {
    tool("get_weather", "reports current weather for a city")
        .param(
            "city",
            ParameterSpec::new(ParameterType::String, "city name").required(),
        )
        .handler(|_ctx, args| async move {
            let mut result = Map::new();
            let city = args.get("city").and_then(Value::as_str).unwrap_or("unknown");
            result.insert("city".to_string(), Value::String(city.to_string()));
            result.insert("temp_c".to_string(), Value::from(18));
            Ok(result)
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn agent_dispatches_a_real_tool_and_feeds_the_response_back() {
    let ctx = Cancellation::new();
    let client = Arc::new(ScriptedClient {
        replies: Mutex::new(vec![
            Response {
                texts: vec![],
                function_calls: vec![FunctionCall {
                    id: "call-1".to_string(),
                    name: "get_weather".to_string(),
                    arguments: {
                        let mut args = Map::new();
                        args.insert("city".to_string(), Value::String("Tokyo".to_string()));
                        args
                    },
                }],
                ..Default::default()
            },
            Response {
                texts: vec!["It's 18C in Tokyo.".to_string()],
                ..Default::default()
            },
        ]),
    });

    let mut agent = Agent::builder(client)
        .system_prompt("You are a weather assistant.")
        .tool(weather_tool())
        .build()
        .unwrap();

    let outcome = agent
        .execute(&ctx, vec![MessageContent::text("What's the weather in Tokyo?")])
        .await
        .unwrap();

    // Natural termination: the second scripted reply has no function
    // calls, so the dispatcher produces no further next_input.
    assert!(outcome.is_none());
}

#[tokio::test]
async fn sub_agent_wired_as_a_tool_delegates_to_a_nested_agent() {
    let inner_client = Arc::new(ScriptedClient {
        replies: Mutex::new(vec![Response {
            texts: vec!["Rust is a systems programming language.".to_string()],
            ..Default::default()
        }]),
    });

    let factory: AgentFactory = Arc::new(move || {
        let inner_client = inner_client.clone();
        Box::pin(async move { Agent::builder(inner_client).build() })
    });

    let researcher = SubAgent::builder("ask_researcher", "delegates a question to a research agent", factory)
        .build()
        .unwrap()
        .into_tool()
        .unwrap();

    let outer_client = Arc::new(ScriptedClient {
        replies: Mutex::new(vec![
            Response {
                texts: vec![],
                function_calls: vec![FunctionCall {
                    id: "call-1".to_string(),
                    name: "ask_researcher".to_string(),
                    arguments: {
                        let mut args = Map::new();
                        args.insert("query".to_string(), Value::String("what is rust?".to_string()));
                        args
                    },
                }],
                ..Default::default()
            },
            Response {
                texts: vec!["Here's what I found.".to_string()],
                ..Default::default()
            },
        ]),
    });

    let mut outer_agent = Agent::builder(outer_client).tool(researcher).build().unwrap();
    let ctx = Cancellation::new();
    let outcome = outer_agent
        .execute(&ctx, vec![MessageContent::text("Ask the researcher about Rust.")])
        .await
        .unwrap();
    assert!(outcome.is_none());

    let history = outer_agent.session().unwrap().history();
    let tool_response = history
        .messages
        .iter()
        .flat_map(|m| m.content.iter())
        .find_map(MessageContent::as_tool_response)
        .expect("a tool_response block was appended to history");
    let response_text = tool_response
        .response
        .get("response")
        .and_then(Value::as_str)
        .unwrap();
    assert!(response_text.contains("systems programming language"));
    assert_eq!(
        tool_response.response.get("status").and_then(Value::as_str),
        Some("success")
    );
}

/// Scenario 2: OpenAI -> JSON -> Claude -> canonical -> OpenAI. Role, tool
/// call ids, tool call names, and payloads survive the whole chain; a tool
/// response's `name` does not survive the Claude hop, since Claude's
/// `tool_result` block carries no name field at all — `to_claude`/
/// `from_claude` already document and test that loss on their own (see
/// `claude.rs`'s `system_round_trips_through_separate_parameter`, which
/// checks `tool_call_id` but deliberately not `name`).
#[test]
fn full_round_trip_through_claude_preserves_ids_and_payloads() {
    let mut original = History::new(HistoryDialect::OpenAi);
    original.push(Message::text(Role::System, "You are helpful"));
    original.push(Message::text(Role::User, "Hi"));

    let mut call_args = Map::new();
    call_args.insert("city".to_string(), Value::String("Tokyo".to_string()));
    original.push(Message::new(
        Role::Assistant,
        vec![MessageContent::ToolCall(agent_core::ToolCallBlock::new(
            "c1",
            "get_weather",
            call_args,
        ))],
    ));

    // `to_openai`/`from_openai` carry a tool response's name at the
    // `Message` level (OpenAI's wire `name` field), not inside the
    // `ToolResponseBlock` itself, so both are set here to the same value.
    let mut payload = Map::new();
    payload.insert("t".to_string(), Value::from(22));
    original.push(
        Message::new(
            Role::Tool,
            vec![MessageContent::ToolResponse(agent_core::ToolResponseBlock {
                tool_call_id: "c1".to_string(),
                name: "get_weather".to_string(),
                response: payload,
                is_error: false,
            })],
        )
        .with_name("get_weather"),
    );

    // Serialize to JSON and back: lossless, no wire adapter involved.
    let value = serde_json::to_value(&original).unwrap();
    let reloaded = History::from_json(value).unwrap();
    assert_eq!(reloaded, original);

    // Canonical -> OpenAI wire -> canonical: lossless, including the tool
    // response's name, since OpenAI messages carry a `name` field.
    let openai_wire = to_openai(&reloaded.messages).unwrap();
    let openai_json = serde_json::to_value(&openai_wire).unwrap();
    let openai_back: Vec<OpenAiMessage> = serde_json::from_value(openai_json).unwrap();
    let via_openai = from_openai(&openai_back).unwrap();
    assert_eq!(via_openai, reloaded.messages);

    // Canonical -> Claude wire (system extracted as a parameter) -> canonical.
    let (system, claude_messages) = to_claude(&via_openai).unwrap();
    assert_eq!(system.as_deref(), Some("You are helpful"));
    let via_claude = from_claude(system.as_deref(), &claude_messages).unwrap();

    // Claude -> OpenAI: role, content ordering, ids, and payload data all
    // made the whole trip.
    let back_to_openai = to_openai(&via_claude).unwrap();
    let final_canonical = from_openai(&back_to_openai).unwrap();

    assert_eq!(final_canonical.len(), original.messages.len());
    assert_eq!(final_canonical[0].role, Role::System);
    assert_eq!(final_canonical[0].joined_text(), "You are helpful");
    assert_eq!(final_canonical[1].role, Role::User);
    assert_eq!(final_canonical[1].joined_text(), "Hi");

    let final_call = final_canonical[2].content[0].as_tool_call().unwrap();
    assert_eq!(final_call.id, "c1");
    assert_eq!(final_call.name, "get_weather");
    assert_eq!(
        final_call.arguments.get("city").unwrap(),
        "Tokyo"
    );

    assert_eq!(final_canonical[3].role, Role::Tool);
    let final_response = final_canonical[3].content[0].as_tool_response().unwrap();
    assert_eq!(final_response.tool_call_id, "c1");
    assert_eq!(final_response.response.get("t").unwrap(), 22);
}
