use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    Human,
    AiPersona,
}

impl SenderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SenderKind::Human => "human",
            SenderKind::AiPersona => "ai_persona",
        }
    }

    pub fn from_kind(value: &str) -> Option<Self> {
        match value {
            "human" => Some(SenderKind::Human),
            "ai_persona" => Some(SenderKind::AiPersona),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionKind {
    User,
    AiRole,
}

/// A resolved `@user` or `@@role` token. `position` is the byte offset of the
/// token's first `@` in the message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub kind: MentionKind,
    pub user_id: String,
    pub username: String,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_kind: SenderKind,
    pub sender_id: String,
    pub content: String,
    pub mentions: Vec<Mention>,
    pub reply_to_id: Option<String>,
    pub ai_validated: bool,
    pub ai_edited: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Human messages are validated on creation.
    pub fn human(chat_id: &str, sender_id: &str, content: &str, mentions: Vec<Mention>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            chat_id: chat_id.to_string(),
            sender_kind: SenderKind::Human,
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            mentions,
            reply_to_id: None,
            ai_validated: true,
            ai_edited: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// AI replies wait for a human to validate them.
    pub fn ai_reply(chat_id: &str, responder_id: &str, content: &str, reply_to: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            chat_id: chat_id.to_string(),
            sender_kind: SenderKind::AiPersona,
            sender_id: responder_id.to_string(),
            content: content.to_string(),
            mentions: Vec::new(),
            reply_to_id: Some(reply_to.to_string()),
            ai_validated: false,
            ai_edited: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ai_mentions(&self) -> impl Iterator<Item = &Mention> {
        self.mentions
            .iter()
            .filter(|m| m.kind == MentionKind::AiRole)
    }

    pub fn is_from_ai(&self) -> bool {
        self.sender_kind == SenderKind::AiPersona
    }
}
