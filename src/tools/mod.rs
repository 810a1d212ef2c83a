pub mod search;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::consts::DEFAULT_TOOL_TIMEOUT_SECS;
use crate::error::ToolError;

/// A single tool invocation request, as parsed from model output.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub args: HashMap<String, String>,
}

/// Describes a tool so the model knows what's available.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
}

/// Outcome of a single tool execution. Errors are information, not failures.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Outcome {
    Success(String),
    Error(String),
}

/// Result of executing a tool call.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub outcome: Outcome,
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Text handed back to the model as the observation.
    pub fn observation(&self) -> String {
        match &self.outcome {
            Outcome::Success(out) => out.clone(),
            Outcome::Error(err) => format!("Tool error: {}", err),
        }
    }
}

/// Something an agent can call while composing its answer.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn execute(&self, args: &HashMap<String, String>) -> Result<String, ToolError>;
}

/// Holds the tools one agent may use. RwLock allows registration + parallel reads.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().await.insert(name, tool);
    }

    pub async fn unregister(&self, name: &str) {
        self.tools.write().await.remove(name);
    }

    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }

    /// Never fails: unknown tools, errors and timeouts all become [`Outcome::Error`].
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let tool = self.tools.read().await.get(&call.tool).cloned();
        let result = match tool {
            Some(tool) => match tokio::time::timeout(self.timeout, tool.execute(&call.args)).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::TimedOut(self.timeout.as_secs())),
            },
            None => Err(ToolError::UnknownTool(call.tool.clone())),
        };

        let outcome = match result {
            Ok(output) => {
                debug!(tool = %call.tool, bytes = output.len(), "tool succeeded");
                Outcome::Success(output)
            }
            Err(e) => {
                warn!(tool = %call.tool, error = %e, "tool failed");
                Outcome::Error(e.to_string())
            }
        };

        ToolResult {
            tool: call.tool.clone(),
            outcome,
        }
    }

    /// Sorted by name so prompts built from them are stable.
    pub async fn descriptions(&self) -> Vec<ToolDescription> {
        let mut descriptions: Vec<_> = self
            .tools
            .read()
            .await
            .values()
            .map(|t| ToolDescription {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect();
        descriptions.sort_by(|a, b| a.name.cmp(&b.name));
        descriptions
    }
}
