//! # Tool Definition and Validation
//!
//! A `Tool` bundles a name, description, parameter schema, and an async
//! handler — the same shape the teacher SDK's own `tools` module uses
//! (`ToolBuilder` / `tool()`), generalized here to the core's provider-
//! neutral `arguments: map<string, any>` / `response: map<string, any>`
//! contract instead of a single JSON-Schema blob.
//!
//! A `ToolSet` is a lazy producer of several tools at once (the spec's
//! "ToolSet-provided tools are wrapped into uniform Tool objects that
//! delegate Run back to the set").

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cancel::Cancellation;
use crate::error::{Error, Result};

/// The JSON-Schema-ish primitive type a parameter accepts. Structural
/// validation in [`validate_arguments`] checks a supplied value against
/// this before any semantic constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// A single parameter's schema: type, description, and optional
/// constraints. Constraints beyond type/required are checked only when
/// present, per the spec's "semantic (required-present, enum-membership,
/// number-range, array-length)" validation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

impl ParameterSpec {
    pub fn new(param_type: ParameterType, description: impl Into<String>) -> Self {
        ParameterSpec {
            param_type,
            description: description.into(),
            required: false,
            enum_values: None,
            default: None,
            minimum: None,
            maximum: None,
            min_items: None,
            max_items: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn with_item_count(mut self, min_items: usize, max_items: usize) -> Self {
        self.min_items = Some(min_items);
        self.max_items = Some(max_items);
        self
    }
}

/// The published shape of a tool: what `Tool::Spec()`/`ToolSet::Specs()`
/// return, and what the registry hands to the model as a callable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, ParameterSpec>,
}

type ToolFuture = BoxFuture<'static, Result<Map<String, Value>>>;

/// A tool's async handler. Takes the cancellation handle threaded through
/// every public entry point and the already-validated argument map.
pub type ToolHandler = Arc<dyn Fn(Cancellation, Map<String, Value>) -> ToolFuture + Send + Sync>;

/// A single invokable capability. Construct with [`tool`]/[`ToolBuilder`]
/// rather than the struct literal — the builder enforces that a handler is
/// always attached.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    parameters: BTreeMap<String, ParameterSpec>,
    handler: ToolHandler,
}

impl Tool {
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

    pub async fn run(
        &self,
        ctx: Cancellation,
        args: Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        (self.handler)(ctx, args).await
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Start building a [`Tool`]. Mirrors the teacher SDK's `tool(name,
/// description)` convenience entry point.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// Fluent builder for [`Tool`]. `.build()` fails with
/// `Error::InvalidTool`/`Error::InvalidParameter` rather than panicking on
/// a malformed spec, per §4.2's "a collision / malformed spec fails to
/// register" startup-error treatment.
pub struct ToolBuilder {
    name: String,
    description: String,
    parameters: BTreeMap<String, ParameterSpec>,
    handler: Option<ToolHandler>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        ToolBuilder {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
            handler: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Cancellation, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Map<String, Value>>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |ctx, args| Box::pin(handler(ctx, args))));
        self
    }

    pub fn build(self) -> Result<Tool> {
        if self.name.is_empty() {
            return Err(Error::invalid_tool("tool name must not be empty"));
        }
        if !is_valid_tool_name(&self.name) {
            return Err(Error::invalid_tool(format!(
                "tool name '{}' must be 1-64 ASCII letters, digits, underscore, or hyphen",
                self.name
            )));
        }
        let handler = self
            .handler
            .ok_or_else(|| Error::invalid_tool(format!("tool '{}' has no handler", self.name)))?;
        Ok(Tool {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            handler,
        })
    }
}

/// Tool names must match the union of every supported provider's naming
/// rules: ASCII letters, digits, underscore, hyphen; 1-64 characters.
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// A lazy producer of several [`Tool`]s at once. The registry wraps each
/// published spec into a uniform [`Tool`] whose handler delegates back to
/// [`ToolSet::run`], so the dispatcher never needs to know a tool came from
/// a set rather than a static registration.
#[async_trait]
pub trait ToolSet: Send + Sync {
    async fn specs(&self, ctx: &Cancellation) -> Result<Vec<ToolSpec>>;

    async fn run(
        &self,
        ctx: Cancellation,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<Map<String, Value>>;
}

/// Validate `args` against `spec`: structural (type match) first, then
/// semantic (required-present, enum-membership, number-range,
/// array-length), short-circuiting on the first failure — matching §4.2's
/// validation order exactly, since its diagnostic becomes
/// `FunctionResponse.error` without a tool ever running.
pub fn validate_arguments(
    parameters: &BTreeMap<String, ParameterSpec>,
    args: &Map<String, Value>,
) -> Result<()> {
    for (name, spec) in parameters {
        match args.get(name) {
            None => {
                if spec.required {
                    return Err(Error::tool_args_validation(format!(
                        "missing required parameter '{name}'"
                    )));
                }
            }
            Some(value) => {
                check_type(name, spec.param_type, value)?;
                if let Some(enum_values) = &spec.enum_values {
                    if !enum_values.contains(value) {
                        return Err(Error::tool_args_validation(format!(
                            "parameter '{name}' must be one of {enum_values:?}"
                        )));
                    }
                }
                if let (Some(min), Some(max)) = (spec.minimum, spec.maximum) {
                    if let Some(n) = value.as_f64() {
                        if n < min || n > max {
                            return Err(Error::tool_args_validation(format!(
                                "parameter '{name}' must be between {min} and {max}"
                            )));
                        }
                    }
                }
                if let (Some(min_items), Some(max_items)) = (spec.min_items, spec.max_items) {
                    if let Some(array) = value.as_array() {
                        if array.len() < min_items || array.len() > max_items {
                            return Err(Error::tool_args_validation(format!(
                                "parameter '{name}' must have between {min_items} and {max_items} items"
                            )));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_type(name: &str, expected: ParameterType, value: &Value) -> Result<()> {
    let matches = match expected {
        ParameterType::String => value.is_string(),
        ParameterType::Number => value.is_number(),
        ParameterType::Integer => value.is_i64() || value.is_u64(),
        ParameterType::Boolean => value.is_boolean(),
        ParameterType::Array => value.is_array(),
        ParameterType::Object => value.is_object(),
    };
    if matches {
        Ok(())
    } else {
        Err(Error::tool_args_validation(format!(
            "parameter '{name}' expected {expected:?}, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_echo_tool() -> Tool {
        tool("echo", "echoes its input back")
            .param(
                "text",
                ParameterSpec::new(ParameterType::String, "text to echo").required(),
            )
            .handler(|_ctx, args| async move { Ok(args) })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn tool_runs_its_handler() {
        let tool = make_echo_tool();
        let mut args = Map::new();
        args.insert("text".to_string(), Value::String("hi".to_string()));
        let result = tool.run(Cancellation::new(), args.clone()).await.unwrap();
        assert_eq!(result, args);
    }

    #[test]
    fn build_rejects_missing_handler() {
        let err = ToolBuilder::new("noop", "does nothing").build().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidTool);
    }

    #[test]
    fn build_rejects_invalid_name() {
        let err = ToolBuilder::new("bad name!", "x")
            .handler(|_, args| async move { Ok(args) })
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidTool);
    }

    #[test]
    fn validate_arguments_rejects_missing_required() {
        let mut params = BTreeMap::new();
        params.insert(
            "city".to_string(),
            ParameterSpec::new(ParameterType::String, "city name").required(),
        );
        let err = validate_arguments(&params, &Map::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ToolArgsValidation);
    }

    #[test]
    fn validate_arguments_rejects_out_of_range_number() {
        let mut params = BTreeMap::new();
        params.insert(
            "count".to_string(),
            ParameterSpec::new(ParameterType::Number, "count").with_range(0.0, 10.0),
        );
        let mut args = Map::new();
        args.insert("count".to_string(), Value::from(42));
        assert!(validate_arguments(&params, &args).is_err());
    }

    #[test]
    fn validate_arguments_accepts_well_formed_args() {
        let mut params = BTreeMap::new();
        params.insert(
            "city".to_string(),
            ParameterSpec::new(ParameterType::String, "city name").required(),
        );
        let mut args = Map::new();
        args.insert("city".to_string(), Value::String("Tokyo".to_string()));
        assert!(validate_arguments(&params, &args).is_ok());
    }
}
