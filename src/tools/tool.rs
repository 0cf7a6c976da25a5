use std::{collections::HashMap, fmt, future::Future, pin::Pin, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ExecutionContext;

use super::errors::ToolExecutionError;

/// Only `function` tools are modeled; matches every provider's tool schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Function,
}

/// Signature for a registered tool handler: `(input, ctx) -> json`
/// (`spec.md` §6, "Tool registry").
pub type AsyncToolFn = Arc<
    dyn Fn(Value, ExecutionContext) -> Pin<Box<dyn Future<Output = Result<Value, ToolExecutionError>> + Send>>
        + Send
        + Sync,
>;

fn default_executor() -> AsyncToolFn {
    Arc::new(|_, _| {
        Box::pin(async {
            Err(ToolExecutionError::ExecutionFailed(
                "tool was deserialized but never rehydrated with a real executor".into(),
            ))
        })
    })
}

/// A named, schema-typed operation invocable by the LLM during a step
/// (`spec.md` GLOSSARY).
#[derive(Serialize, Clone, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: Function,
    #[serde(skip, default = "default_executor")]
    pub executor: AsyncToolFn,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("tool_type", &self.tool_type)
            .field("function", &self.function)
            .field("executor", &"<async_fn>")
            .finish()
    }
}

impl Tool {
    pub async fn execute(&self, args: Value, ctx: ExecutionContext) -> Result<Value, ToolExecutionError> {
        (self.executor)(args, ctx).await
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Function {
    pub name: String,
    pub description: String,
    pub parameters: FunctionParameters,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FunctionParameters {
    #[serde(rename = "type")]
    pub param_type: String,
    pub properties: HashMap<String, Property>,
    pub required: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Property {
    #[serde(rename = "type")]
    pub property_type: String,
    pub description: String,
}

/// A tool invocation the model asked for.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}
