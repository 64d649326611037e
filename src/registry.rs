//! # Tool Registry & Dispatcher
//!
//! Builds a name→tool map from static `Tool`s and `ToolSet`s, wraps
//! dispatch in a configurable middleware chain, and normalizes results
//! before they're fed back to the model. Built fresh at each
//! `Agent::execute`/`Plan::create` (§5: "the tool registry is built fresh
//! ... and is not mutated thereafter"), so a `Registry` has no interior
//! mutability — `dispatch` takes `&self`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::session::{FunctionCall, FunctionResponse};
use crate::tools::{Tool, ToolSet, ToolSpec, validate_arguments};

type ChainFuture = BoxFuture<'static, Result<Map<String, Value>>>;

/// The remaining chain, callable exactly once. A middleware that never
/// calls `next()` short-circuits the tool entirely (e.g. a security gate
/// refusing a call) without the dispatcher needing a separate veto path.
pub type Next = Box<dyn FnOnce() -> ChainFuture + Send>;

/// Wraps tool execution with before/after behavior: logging, rate
/// limiting, audit trails. Registered middlewares compose so the
/// first-registered is outermost (§4.2 step 3, §9 "Middleware
/// composition") — it sees the call first on the way in and last on the
/// way out.
#[async_trait]
pub trait ToolMiddleware: Send + Sync {
    async fn handle(&self, ctx: Cancellation, call: FunctionCall, next: Next) -> Result<Map<String, Value>>;
}

/// A name→tool map built once per `Execute`/`Plan::create`.
pub struct Registry {
    tools: BTreeMap<String, Tool>,
    tool_sets: Vec<Arc<dyn ToolSet>>,
    middleware: Vec<Arc<dyn ToolMiddleware>>,
}

impl Registry {
    /// Build a registry from static tools and tool sets, enforcing globally
    /// unique names across both sources. `tool_sets` are queried eagerly at
    /// build time (`ToolSet::specs`) purely to validate name uniqueness up
    /// front, matching the spec's "fails to begin work" startup-error
    /// treatment for `ErrToolNameConflict`; actual `Run` dispatch to a set
    /// still happens lazily per-call through `ToolSet::run`.
    pub async fn build(
        ctx: &Cancellation,
        tools: Vec<Tool>,
        tool_sets: Vec<Arc<dyn ToolSet>>,
        middleware: Vec<Arc<dyn ToolMiddleware>>,
    ) -> Result<Registry> {
        let mut map = BTreeMap::new();
        for tool in tools {
            let name = tool.name().to_string();
            if map.insert(name.clone(), tool).is_some() {
                return Err(Error::tool_name_conflict(name));
            }
        }

        let mut seen: std::collections::BTreeSet<String> = map.keys().cloned().collect();
        for set in &tool_sets {
            for spec in set.specs(ctx).await? {
                if !seen.insert(spec.name.clone()) {
                    return Err(Error::tool_name_conflict(spec.name));
                }
            }
        }

        Ok(Registry {
            tools: map,
            tool_sets,
            middleware,
        })
    }

    /// All tool specs visible to the model this turn: static tools plus
    /// every tool set's published specs.
    pub async fn specs(&self, ctx: &Cancellation) -> Result<Vec<ToolSpec>> {
        let mut out: Vec<ToolSpec> = self.tools.values().map(Tool::spec).collect();
        for set in &self.tool_sets {
            out.extend(set.specs(ctx).await?);
        }
        Ok(out)
    }

    /// Dispatch every `FunctionCall` in listed order, returning their
    /// `FunctionResponse`s in the same order (§5, "Ordering guarantees").
    /// Never returns `Err` for a tool-level failure — unknown tool,
    /// validation failure, and handler error all become a `FunctionResponse`
    /// carrying `error`, so the caller's loop always continues.
    pub async fn dispatch(&self, ctx: &Cancellation, calls: Vec<FunctionCall>) -> Vec<FunctionResponse> {
        let mut out = Vec::with_capacity(calls.len());
        for call in calls {
            out.push(self.dispatch_one(ctx, call).await);
        }
        out
    }

    async fn dispatch_one(&self, ctx: &Cancellation, call: FunctionCall) -> FunctionResponse {
        if let Some(tool) = self.tools.get(&call.name) {
            let spec = tool.spec();
            if let Err(err) = validate_arguments(&spec.parameters, &call.arguments) {
                return FunctionResponse::failure(call.id, call.name, err.to_string());
            }
            let tool = tool.clone();
            let base: crate::tools::ToolHandler =
                Arc::new(move |ctx, args| Box::pin({
                    let tool = tool.clone();
                    async move { tool.run(ctx, args).await }
                }));
            self.run_with_middleware(ctx.clone(), call, base).await
        } else if self.tool_sets.is_empty() {
            FunctionResponse::failure(call.id.clone(), call.name.clone(), format!("{} is not found", call.name))
        } else {
            self.dispatch_via_tool_sets(ctx, call).await
        }
    }

    async fn dispatch_via_tool_sets(&self, ctx: &Cancellation, call: FunctionCall) -> FunctionResponse {
        // Tool sets are queried for their specs (cheap, already validated at
        // build time) so we can run structural/semantic validation before
        // delegating to ToolSet::run, keeping the "validation never invokes
        // Run" property true for set-provided tools too.
        for set in &self.tool_sets {
            let specs = match set.specs(ctx).await {
                Ok(specs) => specs,
                Err(_) => continue,
            };
            if let Some(spec) = specs.into_iter().find(|s| s.name == call.name) {
                if let Err(err) = validate_arguments(&spec.parameters, &call.arguments) {
                    return FunctionResponse::failure(call.id, call.name, err.to_string());
                }
                let set = set.clone();
                let handler_name = call.name.clone();
                let base: crate::tools::ToolHandler = Arc::new(move |ctx, args| {
                    let set = set.clone();
                    let name = handler_name.clone();
                    Box::pin(async move { set.run(ctx, &name, args).await })
                });
                return self.run_with_middleware(ctx.clone(), call, base).await;
            }
        }
        FunctionResponse::failure(call.id.clone(), call.name.clone(), format!("{} is not found", call.name))
    }

    async fn run_with_middleware(
        &self,
        ctx: Cancellation,
        call: FunctionCall,
        base: crate::tools::ToolHandler,
    ) -> FunctionResponse {
        let middleware: Arc<Vec<Arc<dyn ToolMiddleware>>> = Arc::new(self.middleware.clone());
        let id = call.id.clone();
        let name = call.name.clone();
        match invoke_chain(middleware, 0, ctx, call, base).await {
            Ok(result) => FunctionResponse::success(id, name, result),
            Err(err) => FunctionResponse::failure(id, name, err.to_string()),
        }
    }
}

fn invoke_chain(
    middleware: Arc<Vec<Arc<dyn ToolMiddleware>>>,
    idx: usize,
    ctx: Cancellation,
    call: FunctionCall,
    base: crate::tools::ToolHandler,
) -> ChainFuture {
    if idx >= middleware.len() {
        let args = call.arguments.clone();
        return base(ctx, args);
    }
    Box::pin(async move {
        let mw = middleware[idx].clone();
        let middleware_rest = middleware.clone();
        let ctx_next = ctx.clone();
        let call_next = call.clone();
        let base_next = base.clone();
        let next: Next = Box::new(move || {
            invoke_chain(middleware_rest, idx + 1, ctx_next, call_next, base_next)
        });
        mw.handle(ctx, call, next).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ParameterSpec, ParameterType, tool};

    fn weather_tool() -> Tool {
        tool("get_weather", "reports the weather")
            .param(
                "city",
                ParameterSpec::new(ParameterType::String, "city name").required(),
            )
            .handler(|_ctx, args| async move {
                let mut result = Map::new();
                result.insert("temp".to_string(), Value::from(22));
                let _ = args;
                Ok(result)
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_tool_produces_not_found_without_erroring() {
        let ctx = Cancellation::new();
        let registry = Registry::build(&ctx, vec![], vec![], vec![]).await.unwrap();
        let responses = registry
            .dispatch(
                &ctx,
                vec![FunctionCall {
                    id: "c1".to_string(),
                    name: "ghost".to_string(),
                    arguments: Map::new(),
                }],
            )
            .await;
        assert_eq!(responses.len(), 1);
        assert!(responses[0].is_error());
        assert_eq!(responses[0].error.as_deref(), Some("ghost is not found"));
    }

    #[tokio::test]
    async fn validation_failure_never_invokes_the_tool() {
        let ctx = Cancellation::new();
        let registry = Registry::build(&ctx, vec![weather_tool()], vec![], vec![])
            .await
            .unwrap();
        let responses = registry
            .dispatch(
                &ctx,
                vec![FunctionCall {
                    id: "c1".to_string(),
                    name: "get_weather".to_string(),
                    arguments: Map::new(),
                }],
            )
            .await;
        assert!(responses[0].is_error());
        assert!(responses[0].error.as_ref().unwrap().contains("city"));
    }

    #[tokio::test]
    async fn valid_call_normalizes_a_successful_result() {
        let ctx = Cancellation::new();
        let registry = Registry::build(&ctx, vec![weather_tool()], vec![], vec![])
            .await
            .unwrap();
        let mut args = Map::new();
        args.insert("city".to_string(), Value::String("Tokyo".to_string()));
        let responses = registry
            .dispatch(
                &ctx,
                vec![FunctionCall {
                    id: "c1".to_string(),
                    name: "get_weather".to_string(),
                    arguments: args,
                }],
            )
            .await;
        assert!(!responses[0].is_error());
        assert_eq!(responses[0].result.get("temp").unwrap(), 22);
    }

    #[tokio::test]
    async fn duplicate_static_tool_names_fail_registry_build() {
        let ctx = Cancellation::new();
        let err = Registry::build(&ctx, vec![weather_tool(), weather_tool()], vec![], vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ToolNameConflict);
    }

    struct OrderRecordingMiddleware {
        label: &'static str,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl ToolMiddleware for OrderRecordingMiddleware {
        async fn handle(&self, ctx: Cancellation, call: FunctionCall, next: Next) -> Result<Map<String, Value>> {
            self.order.lock().unwrap().push(self.label);
            let _ = &ctx;
            let result = next().await;
            self.order.lock().unwrap().push(self.label);
            result
        }
    }

    #[tokio::test]
    async fn first_registered_middleware_is_outermost() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let outer = Arc::new(OrderRecordingMiddleware {
            label: "outer",
            order: order.clone(),
        });
        let inner = Arc::new(OrderRecordingMiddleware {
            label: "inner",
            order: order.clone(),
        });
        let ctx = Cancellation::new();
        let registry = Registry::build(&ctx, vec![weather_tool()], vec![], vec![outer, inner])
            .await
            .unwrap();
        let mut args = Map::new();
        args.insert("city".to_string(), Value::String("Tokyo".to_string()));
        registry
            .dispatch(
                &ctx,
                vec![FunctionCall {
                    id: "c1".to_string(),
                    name: "get_weather".to_string(),
                    arguments: args,
                }],
            )
            .await;
        assert_eq!(*order.lock().unwrap(), vec!["outer", "inner", "inner", "outer"]);
    }
}
