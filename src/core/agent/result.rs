use serde::Serialize;

use crate::core::models::AgentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Error,
    Timeout,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Error => "error",
            FinishReason::Timeout => "timeout",
        }
    }
}

/// One tool invocation made during a simple-mode run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub content: String,
    /// The mode that actually ran, after any fallback.
    pub agent_kind: AgentType,
    pub model: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub finish_reason: FinishReason,
    pub error: Option<String>,
}

impl AgentResult {
    pub fn is_success(&self) -> bool {
        self.finish_reason == FinishReason::Stop
    }

    pub(super) fn stop(agent_kind: AgentType, model: &str, content: String) -> Self {
        Self {
            content,
            agent_kind,
            model: model.to_string(),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            error: None,
        }
    }

    /// Partial output is never kept on failure.
    pub(super) fn failed(agent_kind: AgentType, model: &str, err: &anyhow::Error) -> Self {
        let finish_reason = if is_timeout(err) {
            FinishReason::Timeout
        } else {
            FinishReason::Error
        };
        Self {
            content: String::new(),
            agent_kind,
            model: model.to_string(),
            tool_calls: Vec::new(),
            finish_reason,
            error: Some(format!("{:#}", err)),
        }
    }

    pub(super) fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

fn is_timeout(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.is::<tokio::time::error::Elapsed>()
            || cause
                .downcast_ref::<reqwest::Error>()
                .is_some_and(|e| e.is_timeout())
    })
}
