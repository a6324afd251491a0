mod calendar;

pub use calendar::{CalendarCreateTool, CalendarQueryTool};

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::llm::ToolSpec;
use crate::core::models::Role;

/// Who a tool call acts for. Tools scope their effects to this org and role.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub org_id: String,
    pub role_id: String,
    pub user_id: Option<String>,
    pub chat_id: Option<String>,
    pub message_id: Option<String>,
}

impl ToolContext {
    pub fn for_role(role: &Role) -> Self {
        Self {
            org_id: role.org_id.clone(),
            role_id: role.id.clone(),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments object.
    fn parameters(&self) -> serde_json::Value;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    async fn call(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        info!("Registered tool: {}", tool.name());
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tools for a role's `tool_names`, in that order. Unknown names are skipped.
    pub fn resolve(&self, names: &[String]) -> Vec<Arc<dyn Tool>> {
        names
            .iter()
            .filter_map(|name| {
                let tool = self.get(name);
                if tool.is_none() {
                    warn!("Role references unknown tool '{}', skipping", name);
                }
                tool
            })
            .collect()
    }

    pub fn available_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Reads a required string argument.
fn required_str<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing required argument '{}'", key))
}
