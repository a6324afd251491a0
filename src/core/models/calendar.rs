use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OneTime,
    Recurring,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::OneTime => "one_time",
            EventKind::Recurring => "recurring",
        }
    }

    pub fn from_kind(value: &str) -> Option<Self> {
        match value {
            "one_time" => Some(EventKind::OneTime),
            "recurring" => Some(EventKind::Recurring),
            _ => None,
        }
    }
}

/// `next_trigger_at` is the only field the scheduler reads to decide when to
/// fire, for both kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub role_id: String,
    pub org_id: String,
    pub title: String,
    pub description: Option<String>,
    pub kind: EventKind,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub cron_expression: Option<String>,
    pub next_trigger_at: Option<DateTime<Utc>>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub trigger_count: i64,
    pub created_by_user_id: Option<String>,
    pub source_chat_id: Option<String>,
    pub source_message_id: Option<String>,
    pub metadata: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCalendarEvent {
    pub role_id: String,
    pub org_id: String,
    pub title: String,
    pub kind: EventKind,
    pub description: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub cron_expression: Option<String>,
    pub created_by_user_id: Option<String>,
    pub source_chat_id: Option<String>,
    pub source_message_id: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewCalendarEvent {
    pub fn one_time(role_id: &str, org_id: &str, title: &str, at: DateTime<Utc>) -> Self {
        Self::blank(role_id, org_id, title, EventKind::OneTime).at(at)
    }

    pub fn recurring(role_id: &str, org_id: &str, title: &str, cron: &str) -> Self {
        let mut event = Self::blank(role_id, org_id, title, EventKind::Recurring);
        event.cron_expression = Some(cron.to_string());
        event
    }

    pub fn blank(role_id: &str, org_id: &str, title: &str, kind: EventKind) -> Self {
        Self {
            role_id: role_id.to_string(),
            org_id: org_id.to_string(),
            title: title.to_string(),
            kind,
            description: None,
            scheduled_at: None,
            cron_expression: None,
            created_by_user_id: None,
            source_chat_id: None,
            source_message_id: None,
            metadata: serde_json::json!({}),
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn created_by(mut self, user_id: &str) -> Self {
        self.created_by_user_id = Some(user_id.to_string());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub cron_expression: Option<String>,
    pub is_active: Option<bool>,
}
