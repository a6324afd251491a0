mod email;
mod telegram;

pub use email::EmailSender;
pub use telegram::TelegramSender;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::models::{DeliveryStatus, NotificationChannel, NotificationLog};
use crate::core::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub success: bool,
    pub error: Option<String>,
}

impl SendResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Pushes text over one kind of channel. `config` is that channel's opaque
/// per-user settings. Implementations report failure in the result instead
/// of erroring.
#[async_trait]
pub trait Sender: Send + Sync {
    fn kind(&self) -> &str;

    async fn send(&self, config: &serde_json::Value, content: &str) -> SendResult;

    async fn close(&self) {}
}

pub struct NotificationOrchestrator {
    store: Store,
    senders: HashMap<String, Arc<dyn Sender>>,
}

impl NotificationOrchestrator {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            senders: HashMap::new(),
        }
    }

    pub fn register_sender(&mut self, sender: Arc<dyn Sender>) {
        info!("Registered notification sender: {}", sender.kind());
        self.senders.insert(sender.kind().to_string(), sender);
    }

    pub fn sender_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.senders.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Tries the user's enabled channels from highest priority down and stops
    /// at the first success. Every attempt gets its own log row; a failed
    /// channel is not retried within the call.
    pub async fn deliver(
        &self,
        user_id: &str,
        content: &str,
        event_id: Option<&str>,
        role_id: Option<&str>,
    ) -> bool {
        let channels = match self.store.list_channels(user_id, true).await {
            Ok(channels) => channels,
            Err(e) => {
                error!("Could not load channels for {}: {}", user_id, e);
                return false;
            }
        };

        for channel in channels {
            let Some(sender) = self.senders.get(&channel.channel_kind) else {
                warn!("No sender for {} channel of {}", channel.channel_kind, user_id);
                continue;
            };
            if !channel.is_verified {
                info!("Skipping unverified {} channel of {}", channel.channel_kind, user_id);
                continue;
            }

            let log_id = match self
                .store
                .open_delivery_log(user_id, &channel.channel_kind, content, event_id, role_id)
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    error!("Could not record delivery attempt via {}: {}", channel.channel_kind, e);
                    continue;
                }
            };

            let result = sender.send(&channel.config, content).await;
            let (status, err) = if result.success {
                (DeliveryStatus::Sent, None)
            } else {
                let err = result.error.unwrap_or_else(|| "send failed".to_string());
                (DeliveryStatus::Failed, Some(err))
            };
            if let Err(e) = self
                .store
                .close_delivery_log(&log_id, status, err.as_deref())
                .await
            {
                error!("Could not update delivery log {}: {}", log_id, e);
            }

            if status == DeliveryStatus::Sent {
                info!("Delivered to {} via {}", user_id, channel.channel_kind);
                return true;
            }
            warn!(
                "Delivery to {} via {} failed: {}",
                user_id,
                channel.channel_kind,
                err.as_deref().unwrap_or("")
            );
        }

        warn!("No channel delivered notification to {}", user_id);
        false
    }

    pub async fn deliver_many(
        &self,
        user_ids: &[String],
        content: &str,
        event_id: Option<&str>,
        role_id: Option<&str>,
    ) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for user_id in user_ids {
            let ok = self.deliver(user_id, content, event_id, role_id).await;
            results.insert(user_id.clone(), ok);
        }
        results
    }

    pub async fn register_channel(
        &self,
        user_id: &str,
        org_id: &str,
        kind: &str,
        config: serde_json::Value,
        priority: i64,
    ) -> Result<NotificationChannel> {
        let mut channel = NotificationChannel::new(user_id, org_id, kind, config);
        channel.priority = priority;
        let stored = self.store.upsert_channel(&channel).await?;
        info!("Registered {} channel for {}", kind, user_id);
        Ok(stored)
    }

    pub async fn verify_channel(&self, user_id: &str, kind: &str) -> Result<bool> {
        self.store.set_channel_verified(user_id, kind, true).await
    }

    /// Pauses or resumes a channel without losing its config or verification.
    /// `register_channel` re-enables it.
    pub async fn set_channel_enabled(&self, user_id: &str, kind: &str, enabled: bool) -> Result<bool> {
        let updated = self.store.set_channel_enabled(user_id, kind, enabled).await?;
        if updated {
            info!(
                "{} {} channel for {}",
                if enabled { "Enabled" } else { "Disabled" },
                kind,
                user_id
            );
        }
        Ok(updated)
    }

    pub async fn list_channels(&self, user_id: &str, enabled_only: bool) -> Result<Vec<NotificationChannel>> {
        self.store.list_channels(user_id, enabled_only).await
    }

    pub async fn remove_channel(&self, user_id: &str, kind: &str) -> Result<bool> {
        self.store.delete_channel(user_id, kind).await
    }

    pub async fn delivery_log(&self, user_id: &str, limit: usize) -> Result<Vec<NotificationLog>> {
        self.store.list_delivery_log(user_id, limit).await
    }

    pub async fn close(&self) {
        for sender in self.senders.values() {
            sender.close().await;
        }
    }
}
