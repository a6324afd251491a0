use serde::{Deserialize, Serialize};
use tracing::warn;

use super::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Simple,
    Chain,
    Graph,
}

impl AgentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentType::Simple => "simple",
            AgentType::Chain => "chain",
            AgentType::Graph => "graph",
        }
    }

    /// Unknown values run as `simple`; `multi_agent` is the legacy name of `graph`.
    pub fn from_config(value: &str) -> Self {
        match value {
            "simple" => AgentType::Simple,
            "chain" => AgentType::Chain,
            "graph" | "multi_agent" => AgentType::Graph,
            other => {
                warn!("Unknown agent_type '{}', running as simple", other);
                AgentType::Simple
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub org_id: String,
    pub code: String,
    pub name: String,
    pub system_prompt: Option<String>,
    pub prompt_file: Option<String>,
    pub model_name: Option<String>,
    pub agent_type: AgentType,
    pub agent_config: serde_json::Value,
    pub tool_names: Vec<String>,
    pub is_active: bool,
}

impl Role {
    pub fn new(org_id: &str, code: &str, system_prompt: &str) -> Self {
        Self {
            id: new_id(),
            org_id: org_id.to_string(),
            code: code.to_string(),
            name: code.to_string(),
            system_prompt: Some(system_prompt.to_string()),
            prompt_file: None,
            model_name: None,
            agent_type: AgentType::Simple,
            agent_config: serde_json::Value::Null,
            tool_names: Vec::new(),
            is_active: true,
        }
    }
}
