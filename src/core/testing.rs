//! Test doubles shared by the core test modules.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::agent::{AgentDispatcher, AgentLimits, ToolRegistry};
use crate::core::llm::{Completion, CompletionRequest, LlmProvider, ToolCallRequest};
use crate::core::models::{Organization, Role, User};
use crate::core::notify::{SendResult, Sender};
use crate::core::prompt_cache::PromptCache;
use crate::core::store::Store;

/// Replays queued completions in order and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Completion>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replying(texts: &[&str]) -> Self {
        let provider = Self::new();
        for text in texts {
            provider.push_text(text);
        }
        provider
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_text(&self, text: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(Completion::Text(text.to_string())));
    }

    pub fn push_tool_call(&self, name: &str, arguments: serde_json::Value) {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(Completion::ToolCalls(vec![ToolCallRequest {
                id: Some(format!("call_{}", name)),
                name: name.to_string(),
                arguments,
            }])));
    }

    pub fn push_error(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(anyhow!(message.to_string())));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Content of the final message of the n-th request.
    pub fn last_message_of(&self, n: usize) -> String {
        self.requests()[n]
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(anyhow!("script exhausted")))
    }
}

/// Records every send into a journal shared across senders.
pub struct RecordingSender {
    kind: String,
    succeed: bool,
    journal: Arc<Mutex<Vec<String>>>,
}

impl RecordingSender {
    pub fn new(kind: &str, succeed: bool, journal: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            kind: kind.to_string(),
            succeed,
            journal,
        }
    }
}

#[async_trait]
impl Sender for RecordingSender {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn send(&self, _config: &serde_json::Value, content: &str) -> SendResult {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.kind, content));
        if self.succeed {
            SendResult::ok()
        } else {
            SendResult::failed(format!("{} unavailable", self.kind))
        }
    }
}

pub fn dispatcher_with(llm: Arc<ScriptedProvider>, tools: ToolRegistry) -> Arc<AgentDispatcher> {
    Arc::new(AgentDispatcher::new(
        llm,
        Arc::new(PromptCache::new("prompts")),
        Arc::new(tools),
        "test-model",
        AgentLimits::default(),
    ))
}

pub struct Seeded {
    pub store: Store,
    pub org: Organization,
}

impl Seeded {
    pub async fn new() -> Self {
        let store = Store::open_in_memory().unwrap();
        let org = Organization::new("Acme", "acme");
        store.insert_organization(&org).await.unwrap();
        Self { store, org }
    }

    pub async fn role(&self, code: &str, prompt: &str) -> Role {
        let role = Role::new(&self.org.id, code, prompt);
        self.store.insert_role(&role).await.unwrap();
        role
    }

    pub async fn user(&self, username: &str) -> User {
        self.add(User::new(&self.org.id, username)).await
    }

    pub async fn add(&self, user: User) -> User {
        self.store.insert_user(&user).await.unwrap();
        user
    }
}
