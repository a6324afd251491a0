use anyhow::{Result, anyhow};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::mention::MentionResolver;
use crate::core::models::{Chat, ChatKind, Message};
use crate::core::notify::NotificationOrchestrator;
use crate::core::pipeline::ResponsePipeline;
use crate::core::store::Store;

#[derive(Debug, Clone)]
pub struct PostOutcome {
    pub message: Message,
    pub replies: Vec<Message>,
}

/// Inbound message handling: persist, resolve mentions, run at most one AI
/// path, and optionally push replies to the original sender.
pub struct ChatService {
    store: Store,
    mentions: MentionResolver,
    pipeline: Arc<ResponsePipeline>,
    notifier: Option<Arc<NotificationOrchestrator>>,
}

impl ChatService {
    pub fn new(store: Store, pipeline: Arc<ResponsePipeline>) -> Self {
        Self {
            mentions: MentionResolver::new(store.clone()),
            store,
            pipeline,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<NotificationOrchestrator>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn create_chat(
        &self,
        org_id: &str,
        kind: ChatKind,
        name: Option<&str>,
        participants: Vec<String>,
        created_by: Option<&str>,
    ) -> Result<Chat> {
        let mut chat = Chat::new(org_id, kind, name, participants);
        chat.created_by = created_by.map(str::to_string);
        if let Some(creator) = created_by
            && !chat.has_participant(creator)
        {
            chat.participants.insert(0, creator.to_string());
        }
        self.store.insert_chat(&chat).await?;
        info!("Created {} chat {}", kind.as_str(), chat.id);
        Ok(chat)
    }

    pub async fn get_or_create_direct_chat(&self, org_id: &str, a: &str, b: &str) -> Result<Chat> {
        if let Some(chat) = self.store.find_direct_chat(org_id, a, b).await? {
            return Ok(chat);
        }
        self.create_chat(
            org_id,
            ChatKind::Direct,
            None,
            vec![a.to_string(), b.to_string()],
            Some(a),
        )
        .await
    }

    pub async fn post_message(&self, chat_id: &str, sender_id: &str, content: &str) -> Result<PostOutcome> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| anyhow!("chat {} not found", chat_id))?;
        if !chat.has_participant(sender_id) {
            return Err(anyhow!("user {} is not in chat {}", sender_id, chat_id));
        }

        let mentions = self.mentions.resolve(content, &chat.org_id).await?;
        let message = Message::human(chat_id, sender_id, content, mentions);
        self.store.insert_message(&message).await?;
        self.store.touch_chat(chat_id, Utc::now()).await?;

        let replies = self.pipeline.respond(&message).await;
        if let Some(notifier) = &self.notifier {
            for reply in &replies {
                if !notifier.deliver(sender_id, &reply.content, None, None).await {
                    info!("No channel delivered reply {} to {}", reply.id, sender_id);
                }
            }
        }
        Ok(PostOutcome { message, replies })
    }

    /// Approves an AI reply, optionally replacing its text.
    pub async fn validate_ai_message(&self, message_id: &str, edited: Option<&str>) -> Result<Message> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or_else(|| anyhow!("message {} not found", message_id))?;
        if !message.is_from_ai() {
            return Err(anyhow!("message {} is not an AI reply", message_id));
        }
        self.store
            .validate_message(message_id, edited)
            .await?
            .ok_or_else(|| anyhow!("message {} not found", message_id))
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<bool> {
        let deleted = self.store.soft_delete_message(message_id).await?;
        if !deleted {
            warn!("Cannot delete unknown message {}", message_id);
        }
        Ok(deleted)
    }

    pub async fn list_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<Message>> {
        self.store.list_messages(chat_id, limit).await
    }

    pub async fn list_unvalidated(&self, user_id: &str) -> Result<Vec<Message>> {
        self.store.list_unvalidated_for_user(user_id).await
    }
}
