//! # SubAgent — adapting a nested `Agent` as a `Tool`
//!
//! A `SubAgent` lets one agent call another as if it were an ordinary tool
//! call (§4.7): the outer model emits a call against the sub-agent's
//! published spec, the sub-agent renders that call's arguments into a user
//! prompt via a `handlebars` template, spins up a fresh inner `Agent`
//! through a caller-supplied factory, and reports the joined response text
//! back as the tool result. Every inner-agent invocation gets its own
//! session (§4.7 step 4, "independent session each call") — a `SubAgent`
//! never reuses an `Agent` instance across calls.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::agent::Agent;
use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::history::MessageContent;
use crate::templates::render;
use crate::tools::{ParameterSpec, ParameterType, Tool, ToolSpec, validate_arguments};

/// Builds a fresh inner `Agent` for a single `SubAgent::run` call. Returning
/// `Err` (or a factory that itself errors) is reported as
/// `Error::SubAgentFactory` (§4.7, "Factory returning nil or an error").
pub type AgentFactory =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<Agent>> + Send>> + Send + Sync>;

/// The remaining middleware chain for a `SubAgent` call, callable exactly
/// once — mirrors [`crate::registry::Next`] for the tool-dispatch layer,
/// generalized to a single pre/post hook around the inner `Execute` rather
/// than around a raw handler invocation.
pub type SubAgentNext =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<Map<String, Value>>> + Send>> + Send>;

/// Wraps a `SubAgent`'s inner execution with before/after behavior
/// (logging an inbound query, redacting a response, enforcing a rate
/// limit). Composes the same way `ToolMiddleware` does: first-registered
/// is outermost (§4.7 step 3).
#[async_trait]
pub trait SubAgentMiddleware: Send + Sync {
    async fn handle(
        &self,
        ctx: Cancellation,
        args: Map<String, Value>,
        next: SubAgentNext,
    ) -> Result<Map<String, Value>>;
}

/// Default parameter spec published when a `SubAgent` is built without a
/// custom prompt template: a single required `query` string, matching
/// §4.7's "default `{query: string}` parameter."
fn default_parameters() -> BTreeMap<String, ParameterSpec> {
    let mut params = BTreeMap::new();
    params.insert(
        "query".to_string(),
        ParameterSpec::new(ParameterType::String, "the question or task to hand to the sub-agent")
            .required(),
    );
    params
}

const DEFAULT_TEMPLATE: &str = "{{query}}";

/// Adapts a nested `Agent` as a `Tool`. Construct with [`SubAgentBuilder`].
pub struct SubAgent {
    name: String,
    description: String,
    parameters: BTreeMap<String, ParameterSpec>,
    template: String,
    factory: AgentFactory,
    middleware: Vec<Arc<dyn SubAgentMiddleware>>,
}

impl SubAgent {
    pub fn builder(name: impl Into<String>, description: impl Into<String>, factory: AgentFactory) -> SubAgentBuilder {
        SubAgentBuilder::new(name, description, factory)
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wrap this sub-agent as an ordinary [`Tool`] so it can be registered
    /// alongside any other tool in an [`crate::agent::AgentBuilder`] — the
    /// outer model never needs to know the call it issues is secretly
    /// delegated to a nested agent.
    pub fn into_tool(self) -> Result<Tool> {
        let sub_agent = Arc::new(self);
        let mut builder = crate::tools::tool(sub_agent.name.clone(), sub_agent.description.clone());
        for (name, spec) in &sub_agent.parameters {
            builder = builder.param(name.clone(), spec.clone());
        }
        builder
            .handler(move |ctx, args| {
                let sub_agent = sub_agent.clone();
                async move { sub_agent.run(ctx, args).await }
            })
            .build()
    }

    /// Run the sub-agent against already-dispatched tool arguments (§4.7
    /// steps 1-4). Registry-level validation has already run by the time a
    /// `Tool::run` wraps this, but a `SubAgent` may also be invoked
    /// directly, so arguments are validated here too.
    pub async fn run(&self, ctx: Cancellation, args: Map<String, Value>) -> Result<Map<String, Value>> {
        validate_arguments(&self.parameters, &args)?;
        let middleware_args = args.clone();
        let filled = fill_zero_values(&self.parameters, args);

        let factory = self.factory.clone();
        let template = self.template.clone();
        let inner_ctx = ctx.clone();
        let base: SubAgentNext = Box::new(move || {
            Box::pin(async move {
                let prompt = render(&template, &filled)?;
                let mut agent = factory()
                    .await
                    .map_err(|err| Error::sub_agent_factory(err.to_string()))?;
                let response = agent
                    .execute(&inner_ctx, vec![MessageContent::text(prompt)])
                    .await?;
                let joined = response.map(|r| r.joined_text()).unwrap_or_default();
                let mut result = Map::new();
                result.insert("response".to_string(), Value::String(joined));
                result.insert("status".to_string(), Value::String("success".to_string()));
                Ok(result)
            })
        });

        let middleware = Arc::new(self.middleware.clone());
        invoke_chain(middleware, 0, ctx, middleware_args, base).await
    }
}

fn invoke_chain(
    middleware: Arc<Vec<Arc<dyn SubAgentMiddleware>>>,
    idx: usize,
    ctx: Cancellation,
    args: Map<String, Value>,
    base: SubAgentNext,
) -> Pin<Box<dyn Future<Output = Result<Map<String, Value>>> + Send>> {
    if idx >= middleware.len() {
        return base();
    }
    Box::pin(async move {
        let mw = middleware[idx].clone();
        let middleware_rest = middleware.clone();
        let ctx_next = ctx.clone();
        let args_next = args.clone();
        let next: SubAgentNext = Box::new(move || {
            invoke_chain(middleware_rest, idx + 1, ctx_next, args_next, base)
        });
        mw.handle(ctx, args, next).await
    })
}

fn fill_zero_values(parameters: &BTreeMap<String, ParameterSpec>, mut args: Map<String, Value>) -> Map<String, Value> {
    for (name, spec) in parameters {
        if args.contains_key(name) {
            continue;
        }
        if let Some(default) = &spec.default {
            args.insert(name.clone(), default.clone());
            continue;
        }
        let zero = match spec.param_type {
            ParameterType::String => Value::String(String::new()),
            ParameterType::Number | ParameterType::Integer => Value::from(0),
            ParameterType::Boolean => Value::Bool(false),
            ParameterType::Array => Value::Array(Vec::new()),
            ParameterType::Object => Value::Object(Map::new()),
        };
        args.insert(name.clone(), zero);
    }
    args
}

/// Fluent builder for [`SubAgent`]. Mirrors [`crate::tools::ToolBuilder`]:
/// required fields up front, optional configuration via chained setters,
/// validated at `.build()`.
pub struct SubAgentBuilder {
    name: String,
    description: String,
    parameters: Option<BTreeMap<String, ParameterSpec>>,
    template: Option<String>,
    factory: AgentFactory,
    middleware: Vec<Arc<dyn SubAgentMiddleware>>,
}

impl SubAgentBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>, factory: AgentFactory) -> Self {
        SubAgentBuilder {
            name: name.into(),
            description: description.into(),
            parameters: None,
            template: None,
            factory,
            middleware: Vec::new(),
        }
    }

    /// Declare a custom parameter set and the handlebars template that
    /// renders them into the inner agent's prompt. If never called, the
    /// sub-agent publishes the default `{query: string}` parameter and
    /// forwards `query` verbatim.
    pub fn prompt_template(mut self, parameters: BTreeMap<String, ParameterSpec>, template: impl Into<String>) -> Self {
        self.parameters = Some(parameters);
        self.template = Some(template.into());
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn SubAgentMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn build(self) -> Result<SubAgent> {
        if !crate::tools::is_valid_tool_name(&self.name) {
            return Err(Error::invalid_tool(format!(
                "sub-agent name '{}' must be 1-64 ASCII letters, digits, underscore, or hyphen",
                self.name
            )));
        }
        Ok(SubAgent {
            name: self.name,
            description: self.description,
            parameters: self.parameters.unwrap_or_else(default_parameters),
            template: self.template.unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
            factory: self.factory,
            middleware: self.middleware,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::error::Result as CrateResult;
    use crate::history::{History, HistoryDialect};
    use crate::session::{LlmClient, Response, Session, SessionOptions};
    use std::sync::Mutex;

    struct EchoSession {
        history: History,
    }

    #[async_trait]
    impl Session for EchoSession {
        fn dialect(&self) -> HistoryDialect {
            HistoryDialect::OpenAi
        }

        async fn generate_content(
            &mut self,
            _ctx: &Cancellation,
            inputs: Vec<MessageContent>,
        ) -> CrateResult<Response> {
            let text = inputs
                .iter()
                .filter_map(MessageContent::as_text)
                .collect::<Vec<_>>()
                .join(" ");
            Ok(Response {
                texts: vec![format!("handled: {text}")],
                ..Default::default()
            })
        }

        async fn generate_stream(
            &mut self,
            _ctx: &Cancellation,
            _inputs: Vec<MessageContent>,
        ) -> CrateResult<tokio::sync::mpsc::Receiver<Response>> {
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

    struct EchoClient;

    #[async_trait]
    impl LlmClient for EchoClient {
        async fn new_session(
            &self,
            _ctx: &Cancellation,
            _options: SessionOptions,
        ) -> CrateResult<Box<dyn Session>> {
            Ok(Box::new(EchoSession {
                history: History::new(HistoryDialect::OpenAi),
            }))
        }

        async fn generate_embedding(
            &self,
            _ctx: &Cancellation,
            _dim: usize,
            _inputs: &[String],
        ) -> CrateResult<Vec<Vec<f64>>> {
            Ok(vec![])
        }

        async fn count_tokens(&self, _ctx: &Cancellation, _history: &History) -> CrateResult<u64> {
            Ok(0)
        }
    }

    fn echo_factory() -> AgentFactory {
        Arc::new(|| {
            Box::pin(async move {
                Agent::builder(Arc::new(EchoClient)).build()
            })
        })
    }

    #[tokio::test]
    async fn default_parameters_publish_required_query() {
        let sub_agent = SubAgent::builder("research", "delegates research questions", echo_factory())
            .build()
            .unwrap();
        let spec = sub_agent.spec();
        assert!(spec.parameters.get("query").unwrap().required);
    }

    #[tokio::test]
    async fn run_renders_template_and_returns_success_envelope() {
        let sub_agent = SubAgent::builder("research", "delegates research questions", echo_factory())
            .build()
            .unwrap();
        let mut args = Map::new();
        args.insert("query".to_string(), Value::String("what is rust".to_string()));
        let result = sub_agent.run(Cancellation::new(), args).await.unwrap();
        assert_eq!(result.get("status").unwrap(), "success");
        assert_eq!(
            result.get("response").unwrap(),
            "handled: what is rust"
        );
    }

    #[tokio::test]
    async fn missing_optional_value_substitutes_zero_value() {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "topic".to_string(),
            ParameterSpec::new(ParameterType::String, "topic").required(),
        );
        parameters.insert(
            "urgent".to_string(),
            ParameterSpec::new(ParameterType::Boolean, "urgency flag"),
        );
        let sub_agent = SubAgent::builder("research", "delegates research questions", echo_factory())
            .prompt_template(parameters, "{{topic}} urgent={{urgent}}")
            .build()
            .unwrap();
        let mut args = Map::new();
        args.insert("topic".to_string(), Value::String("rust".to_string()));
        let result = sub_agent.run(Cancellation::new(), args).await.unwrap();
        assert_eq!(result.get("response").unwrap(), "handled: rust urgent=false");
    }

    #[tokio::test]
    async fn factory_error_is_reported_as_sub_agent_factory() {
        let failing_factory: AgentFactory = Arc::new(|| {
            Box::pin(async move { Err(Error::other("boom")) })
        });
        let sub_agent = SubAgent::builder("research", "delegates research questions", failing_factory)
            .build()
            .unwrap();
        let mut args = Map::new();
        args.insert("query".to_string(), Value::String("x".to_string()));
        let err = sub_agent.run(Cancellation::new(), args).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SubAgentFactory);
    }

    #[tokio::test]
    async fn into_tool_runs_the_same_dispatch_path() {
        let tool = SubAgent::builder("research", "delegates research questions", echo_factory())
            .build()
            .unwrap()
            .into_tool()
            .unwrap();
        let mut args = Map::new();
        args.insert("query".to_string(), Value::String("what is rust".to_string()));
        let result = tool.run(Cancellation::new(), args).await.unwrap();
        assert_eq!(result.get("status").unwrap(), "success");
    }

    #[tokio::test]
    async fn missing_required_argument_is_rejected_before_factory_runs() {
        let called = Arc::new(Mutex::new(false));
        let called_clone = called.clone();
        let factory: AgentFactory = Arc::new(move || {
            let called = called_clone.clone();
            Box::pin(async move {
                *called.lock().unwrap() = true;
                Agent::builder(Arc::new(EchoClient)).build()
            })
        });
        let sub_agent = SubAgent::builder("research", "delegates research questions", factory)
            .build()
            .unwrap();
        let err = sub_agent.run(Cancellation::new(), Map::new()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ToolArgsValidation);
        assert!(!*called.lock().unwrap());
    }
}
