use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Main,
    Direct,
    Group,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatKind::Main => "main",
            ChatKind::Direct => "direct",
            ChatKind::Group => "group",
        }
    }

    pub fn from_kind(value: &str) -> Option<Self> {
        match value {
            "main" => Some(ChatKind::Main),
            "direct" => Some(ChatKind::Direct),
            "group" => Some(ChatKind::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub org_id: String,
    pub kind: ChatKind,
    pub name: Option<String>,
    /// User ids in join order.
    pub participants: Vec<String>,
    pub created_by: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(org_id: &str, kind: ChatKind, name: Option<&str>, participants: Vec<String>) -> Self {
        Self {
            id: new_id(),
            org_id: org_id.to_string(),
            kind,
            name: name.map(str::to_string),
            participants,
            created_by: None,
            last_message_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}
