use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use super::{Store, enum_column, json_column};
use crate::core::models::{Chat, ChatKind};

const CHAT_COLUMNS: &str =
    "id, org_id, kind, name, participants, created_by, last_message_at, created_at";

fn chat_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        org_id: row.get(1)?,
        kind: enum_column(row, 2, ChatKind::from_kind)?,
        name: row.get(3)?,
        participants: json_column(row, 4)?,
        created_by: row.get(5)?,
        last_message_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl Store {
    pub async fn insert_chat(&self, chat: &Chat) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO chats (id, org_id, kind, name, participants, created_by, last_message_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                chat.id,
                chat.org_id,
                chat.kind.as_str(),
                chat.name,
                serde_json::to_string(&chat.participants)?,
                chat.created_by,
                chat.last_message_at,
                chat.created_at
            ],
        )?;
        Ok(())
    }

    pub async fn get_chat(&self, id: &str) -> Result<Option<Chat>> {
        let db = self.db.lock().await;
        let chat = db
            .query_row(
                &format!("SELECT {} FROM chats WHERE id = ?1", CHAT_COLUMNS),
                params![id],
                chat_from_row,
            )
            .optional()?;
        Ok(chat)
    }

    /// Direct chats are looked up by their exact two-member participant set.
    pub async fn find_direct_chat(&self, org_id: &str, a: &str, b: &str) -> Result<Option<Chat>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM chats WHERE org_id = ?1 AND kind = 'direct'",
            CHAT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![org_id], chat_from_row)?;
        for row in rows {
            let chat = row?;
            if chat.participants.len() == 2 && chat.has_participant(a) && chat.has_participant(b) {
                return Ok(Some(chat));
            }
        }
        Ok(None)
    }

    pub async fn touch_chat(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE chats SET last_message_at = ?2 WHERE id = ?1",
            params![id, at],
        )?;
        Ok(())
    }
}
