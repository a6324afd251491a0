use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub user_id: String,
    pub org_id: String,
    /// Matches `Sender::kind`, e.g. `telegram` or `email`.
    pub channel_kind: String,
    pub config: serde_json::Value,
    pub is_enabled: bool,
    pub is_verified: bool,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
}

impl NotificationChannel {
    pub fn new(user_id: &str, org_id: &str, channel_kind: &str, config: serde_json::Value) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            org_id: org_id.to_string(),
            channel_kind: channel_kind.to_string(),
            config,
            is_enabled: true,
            is_verified: false,
            priority: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DeliveryStatus::Pending),
            "sent" => Some(DeliveryStatus::Sent),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: String,
    pub user_id: String,
    pub channel_kind: String,
    pub event_id: Option<String>,
    pub role_id: Option<String>,
    pub content: String,
    pub status: DeliveryStatus,
    pub attempts: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}
