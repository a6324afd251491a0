use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::agent::{AgentDispatcher, ToolContext};
use crate::core::llm::ChatMessage;
use crate::core::mention;
use crate::core::models::{Message, User};
use crate::core::responder::ResponderResolver;
use crate::core::store::Store;

#[derive(Debug, Clone)]
pub struct ReplySettings {
    /// Prior messages included as context.
    pub history_limit: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self {
            history_limit: 10,
            temperature: 0.7,
            max_tokens: 256,
        }
    }
}

/// Turns an inbound message into AI persona replies. Every failure is logged
/// and yields no reply; nothing is written unless generation succeeded.
pub struct ResponsePipeline {
    store: Store,
    responders: ResponderResolver,
    dispatcher: Arc<AgentDispatcher>,
    settings: ReplySettings,
}

impl ResponsePipeline {
    pub fn new(store: Store, dispatcher: Arc<AgentDispatcher>, settings: ReplySettings) -> Self {
        Self {
            responders: ResponderResolver::new(store.clone()),
            store,
            dispatcher,
            settings,
        }
    }

    /// Mention-triggered replies take precedence over auto-respond.
    pub async fn respond(&self, message: &Message) -> Vec<Message> {
        if message.ai_mentions().next().is_some() {
            return self.process_ai_mentions(message).await;
        }
        self.try_auto_respond(message, &message.chat_id, &message.sender_id)
            .await
            .into_iter()
            .collect()
    }

    /// One reply per `@@` mention, in mention order.
    pub async fn process_ai_mentions(&self, message: &Message) -> Vec<Message> {
        let mut replies = Vec::new();
        for mention in message.ai_mentions() {
            if let Some(reply) = self
                .generate_response(message, &mention.user_id, Some(&mention.username))
                .await
            {
                replies.push(reply);
            }
        }
        replies
    }

    /// Lets a mirror persona in the chat answer a message that mentions no AI.
    pub async fn try_auto_respond(
        &self,
        message: &Message,
        chat_id: &str,
        sender_id: &str,
    ) -> Option<Message> {
        if message.is_from_ai() {
            return None;
        }
        match self.find_auto_responder(chat_id, sender_id).await {
            Ok(Some(persona)) => {
                info!("Auto-responding in chat {} as {}", chat_id, persona.username);
                self.generate_response(message, &persona.id, None).await
            }
            Ok(None) => None,
            Err(e) => {
                error!("Auto-respond lookup failed for chat {}: {}", chat_id, e);
                None
            }
        }
    }

    async fn find_auto_responder(&self, chat_id: &str, sender_id: &str) -> Result<Option<User>> {
        let Some(chat) = self.store.get_chat(chat_id).await? else {
            warn!("Chat {} not found", chat_id);
            return Ok(None);
        };
        for participant in chat.participants.iter().filter(|p| *p != sender_id) {
            if let Some(user) = self.store.get_user(participant).await?
                && user.is_system_persona
            {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }

    pub async fn generate_response(
        &self,
        message: &Message,
        responder_user_id: &str,
        strip_username: Option<&str>,
    ) -> Option<Message> {
        match self.try_generate(message, responder_user_id, strip_username).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    "Failed to generate reply to {} as {}: {}",
                    message.id, responder_user_id, e
                );
                None
            }
        }
    }

    async fn try_generate(
        &self,
        message: &Message,
        responder_user_id: &str,
        strip_username: Option<&str>,
    ) -> Result<Option<Message>> {
        let Some(responder) = self.store.get_user(responder_user_id).await? else {
            warn!("Responder {} not found", responder_user_id);
            return Ok(None);
        };
        let Some(role) = self
            .responders
            .resolve_role(&responder, &message.sender_id)
            .await?
        else {
            return Ok(None);
        };
        if !role.is_active {
            warn!("Role {} is inactive, {} stays silent", role.code, responder.username);
            return Ok(None);
        }

        let context = self.build_context(message, strip_username).await?;
        let tool_ctx = ToolContext {
            org_id: role.org_id.clone(),
            role_id: role.id.clone(),
            user_id: Some(message.sender_id.clone()),
            chat_id: Some(message.chat_id.clone()),
            message_id: Some(message.id.clone()),
        };
        let result = self
            .dispatcher
            .execute_in(
                &role,
                context,
                self.settings.temperature,
                self.settings.max_tokens,
                &tool_ctx,
            )
            .await;
        if !result.is_success() {
            warn!(
                "{} produced no reply ({}): {}",
                responder.username,
                result.finish_reason.as_str(),
                result.error.as_deref().unwrap_or("")
            );
            return Ok(None);
        }

        let reply = Message::ai_reply(&message.chat_id, &responder.id, &result.content, &message.id);
        self.store.insert_message(&reply).await?;
        self.store.touch_chat(&message.chat_id, Utc::now()).await?;
        info!(
            "{} replied to {} as role {}",
            responder.username, message.id, role.code
        );
        Ok(Some(reply))
    }

    /// Prior messages oldest first, then the current one with the routing
    /// token stripped. AI-authored turns become `assistant`.
    async fn build_context(
        &self,
        message: &Message,
        strip_username: Option<&str>,
    ) -> Result<Vec<ChatMessage>> {
        let history = self
            .store
            .recent_messages_before(&message.id, self.settings.history_limit)
            .await?;

        let mut context: Vec<ChatMessage> = history
            .into_iter()
            .map(|m| {
                if m.is_from_ai() {
                    ChatMessage::assistant(m.content)
                } else {
                    ChatMessage::user(m.content)
                }
            })
            .collect();

        let current = match strip_username {
            Some(username) => mention::strip(&message.content, username),
            None => message.content.clone(),
        };
        context.push(ChatMessage::user(current));
        Ok(context)
    }
}
