use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::agent::tools::{CalendarCreateTool, CalendarQueryTool};
use crate::core::agent::{AgentDispatcher, AgentLimits, ToolRegistry};
use crate::core::calendar::CalendarEngine;
use crate::core::chat::ChatService;
use crate::core::config::AppConfig;
use crate::core::lifecycle::{LifecycleComponent, LifecycleManager};
use crate::core::llm::{LlmProvider, OpenAiCompatProvider};
use crate::core::notify::{EmailSender, NotificationOrchestrator, TelegramSender};
use crate::core::pipeline::{ReplySettings, ResponsePipeline};
use crate::core::prompt_cache::PromptCache;
use crate::core::scheduler::Scheduler;
use crate::core::store::Store;

/// Closes notification senders at shutdown.
struct NotifierShutdown(Arc<NotificationOrchestrator>);

#[async_trait::async_trait]
impl LifecycleComponent for NotifierShutdown {
    async fn on_shutdown(&mut self) -> Result<()> {
        self.0.close().await;
        Ok(())
    }
}

/// Every service wired over one store.
pub struct Engine {
    pub config: AppConfig,
    pub store: Store,
    pub prompts: Arc<PromptCache>,
    pub calendar: Arc<CalendarEngine>,
    pub dispatcher: Arc<AgentDispatcher>,
    pub notifier: Arc<NotificationOrchestrator>,
    pub chat: ChatService,
    pub scheduler: Arc<Mutex<Scheduler>>,
}

impl Engine {
    pub async fn build(config: AppConfig) -> Result<Self> {
        let store = Store::open(&config.database.path).await?;
        let llm: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatProvider::new(
            &config.llm.base_url,
            config.llm.api_key.clone(),
            config.llm_timeout(),
        )?);
        info!(
            "LLM endpoint {} (default model {})",
            config.llm.base_url, config.llm.default_model
        );
        let notifier = notifier_from_config(&config, store.clone());
        Ok(Self::assemble(config, store, llm, notifier))
    }

    pub fn assemble(
        config: AppConfig,
        store: Store,
        llm: Arc<dyn LlmProvider>,
        notifier: NotificationOrchestrator,
    ) -> Self {
        let prompts = Arc::new(PromptCache::new(config.prompts.dir.clone()));
        let calendar = Arc::new(CalendarEngine::new(store.clone()));

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(CalendarCreateTool::new(calendar.clone())));
        tools.register(Arc::new(CalendarQueryTool::new(calendar.clone())));
        info!("Agent tools: {}", tools.available_tools().join(", "));

        let limits = AgentLimits {
            max_tool_iterations: config.agent.max_tool_iterations,
            tool_budget: std::time::Duration::from_secs(config.agent.tool_budget_secs),
        };
        let dispatcher = Arc::new(AgentDispatcher::new(
            llm,
            prompts.clone(),
            Arc::new(tools),
            config.llm.default_model.clone(),
            limits,
        ));

        let settings = ReplySettings {
            history_limit: config.agent.history_limit,
            temperature: config.agent.reply_temperature,
            max_tokens: config.agent.reply_max_tokens,
        };
        let pipeline = Arc::new(ResponsePipeline::new(store.clone(), dispatcher.clone(), settings));
        let notifier = Arc::new(notifier);

        let mut chat = ChatService::new(store.clone(), pipeline);
        if config.chat.push_replies {
            chat = chat.with_notifier(notifier.clone());
        }

        let scheduler = Scheduler::new(
            calendar.clone(),
            store.clone(),
            Some(dispatcher.clone()),
            notifier.clone(),
            config.poll_interval(),
        );

        Self {
            config,
            store,
            prompts,
            calendar,
            dispatcher,
            notifier,
            chat,
            scheduler: Arc::new(Mutex::new(scheduler)),
        }
    }

    /// Scheduler first (when enabled), then sender cleanup.
    pub fn lifecycle(&self) -> LifecycleManager {
        let mut manager = LifecycleManager::new();
        if self.config.scheduler.enabled {
            manager.attach(self.scheduler.clone());
        } else {
            info!("Scheduler disabled by config");
        }
        manager.attach(Arc::new(Mutex::new(NotifierShutdown(self.notifier.clone()))));
        manager
    }
}

fn notifier_from_config(config: &AppConfig, store: Store) -> NotificationOrchestrator {
    let mut notifier = NotificationOrchestrator::new(store);
    if let Some(token) = config.telegram.bot_token.as_deref().filter(|t| !t.is_empty()) {
        notifier.register_sender(Arc::new(TelegramSender::new(token)));
    }
    if config.smtp.host.is_some() {
        match EmailSender::new(&config.smtp) {
            Ok(sender) => notifier.register_sender(Arc::new(sender)),
            Err(e) => warn!("Email notifications disabled: {}", e),
        }
    }
    if notifier.sender_kinds().is_empty() {
        warn!("No notification senders configured; reminders will only be logged");
    }
    notifier
}
