//! Agent dispatch: runs a role's configured behavior (simple, chain or graph)
//! against the LLM capability and always hands back an [`AgentResult`].

mod chain;
mod graph;
pub mod plan;
mod result;
mod simple;
pub mod tools;


use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use result::{AgentResult, FinishReason, ToolCallRecord};
pub use tools::{Tool, ToolContext, ToolRegistry};

use crate::core::llm::{ChatMessage, Completion, CompletionRequest, LlmProvider, ToolSpec};
use crate::core::models::{AgentType, Role};
use crate::core::prompt_cache::PromptCache;
use plan::ExecutionPlan;

#[derive(Debug, Clone)]
pub struct AgentLimits {
    pub max_tool_iterations: usize,
    /// Wall-clock budget for a whole tool-use loop.
    pub tool_budget: Duration,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_tool_iterations: 8,
            tool_budget: Duration::from_secs(120),
        }
    }
}

/// Everything one mode handler needs for a single dispatch.
pub(crate) struct RunContext<'a> {
    llm: &'a dyn LlmProvider,
    model: &'a str,
    system_prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
    tools: Vec<Arc<dyn Tool>>,
    tool_ctx: &'a ToolContext,
    limits: &'a AgentLimits,
}

impl RunContext<'_> {
    fn request(&self, messages: Vec<ChatMessage>, tools: Vec<ToolSpec>) -> CompletionRequest {
        CompletionRequest {
            model: self.model.to_string(),
            system_prompt: self.system_prompt.to_string(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
        }
    }

    /// A completion with no tools offered; a tool call here is an error.
    async fn complete_text(&self, messages: Vec<ChatMessage>) -> Result<String> {
        match self.llm.complete(&self.request(messages, Vec::new())).await? {
            Completion::Text(text) => Ok(text),
            Completion::ToolCalls(calls) => Err(anyhow!(
                "model requested {} tool call(s) but no tools were offered",
                calls.len()
            )),
        }
    }
}

pub struct AgentDispatcher {
    llm: Arc<dyn LlmProvider>,
    prompts: Arc<PromptCache>,
    tools: Arc<ToolRegistry>,
    default_model: String,
    limits: AgentLimits,
}

impl AgentDispatcher {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        prompts: Arc<PromptCache>,
        tools: Arc<ToolRegistry>,
        default_model: impl Into<String>,
        limits: AgentLimits,
    ) -> Self {
        Self {
            llm,
            prompts,
            tools,
            default_model: default_model.into(),
            limits,
        }
    }

    pub async fn execute(
        &self,
        role: &Role,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> AgentResult {
        let ctx = ToolContext::for_role(role);
        self.execute_in(role, messages, temperature, max_tokens, &ctx)
            .await
    }

    /// Like [`execute`](Self::execute), with tools acting on behalf of `tool_ctx`.
    pub async fn execute_in(
        &self,
        role: &Role,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
        tool_ctx: &ToolContext,
    ) -> AgentResult {
        let model = role
            .model_name
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.default_model.clone());

        let plan = match plan::resolve(role) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Role {} has unusable {} config: {}", role.code, role.agent_type.as_str(), e);
                return AgentResult::failed(role.agent_type, &model, &anyhow!(e));
            }
        };
        let kind = plan.agent_type();
        if kind != role.agent_type {
            info!(
                "Role {} configured as {} dispatches as {}",
                role.code,
                role.agent_type.as_str(),
                kind.as_str()
            );
        }

        let system_prompt = self.prompts.get_prompt(role).await;
        let run = RunContext {
            llm: self.llm.as_ref(),
            model: &model,
            system_prompt: &system_prompt,
            temperature,
            max_tokens,
            tools: self.tools.resolve(&role.tool_names),
            tool_ctx,
            limits: &self.limits,
        };

        let result = match &plan {
            ExecutionPlan::Simple => {
                let mut records = Vec::new();
                let outcome = simple::run(&run, messages, &mut records).await;
                finish(kind, &model, outcome).with_tool_calls(records)
            }
            ExecutionPlan::Chain(steps) => finish(kind, &model, chain::run(&run, steps, &messages).await),
            ExecutionPlan::Graph(graph) => finish(kind, &model, graph::run(&run, graph, &messages).await),
        };

        match result.finish_reason {
            FinishReason::Stop => info!(
                "Role {} answered via {} ({} tool calls)",
                role.code,
                kind.as_str(),
                result.tool_calls.len()
            ),
            reason => warn!(
                "Role {} dispatch ended with {}: {}",
                role.code,
                reason.as_str(),
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }
        result
    }
}

fn finish(kind: AgentType, model: &str, outcome: Result<String>) -> AgentResult {
    match outcome {
        Ok(content) => AgentResult::stop(kind, model, content),
        Err(e) => AgentResult::failed(kind, model, &e),
    }
}

/// Content of the most recent user turn, or empty.
fn last_user_message(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or("")
}
