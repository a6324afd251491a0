use anyhow::Result;
use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::{Store, enum_column, json_column};
use crate::core::models::{Message, SenderKind};

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_kind, sender_id, content, mentions, reply_to_id, \
     ai_validated, ai_edited, is_deleted, created_at, updated_at";

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_kind: enum_column(row, 2, SenderKind::from_kind)?,
        sender_id: row.get(3)?,
        content: row.get(4)?,
        mentions: json_column(row, 5)?,
        reply_to_id: row.get(6)?,
        ai_validated: row.get(7)?,
        ai_edited: row.get(8)?,
        is_deleted: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn collect(rows: impl Iterator<Item = rusqlite::Result<Message>>) -> Result<Vec<Message>> {
    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

impl Store {
    pub async fn insert_message(&self, msg: &Message) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO messages (id, chat_id, sender_kind, sender_id, content, mentions, reply_to_id,
                                   ai_validated, ai_edited, is_deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                msg.id,
                msg.chat_id,
                msg.sender_kind.as_str(),
                msg.sender_id,
                msg.content,
                serde_json::to_string(&msg.mentions)?,
                msg.reply_to_id,
                msg.ai_validated,
                msg.ai_edited,
                msg.is_deleted,
                msg.created_at,
                msg.updated_at
            ],
        )?;
        Ok(())
    }

    pub async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let db = self.db.lock().await;
        let msg = db
            .query_row(
                &format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS),
                params![id],
                message_from_row,
            )
            .optional()?;
        Ok(msg)
    }

    /// Up to `limit` live messages of the same chat stored before `message_id`,
    /// oldest first.
    pub async fn recent_messages_before(&self, message_id: &str, limit: usize) -> Result<Vec<Message>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM (
                SELECT m.*, m.seq AS ord FROM messages m
                JOIN messages cur ON cur.id = ?1
                WHERE m.chat_id = cur.chat_id AND m.seq < cur.seq AND m.is_deleted = 0
                ORDER BY m.seq DESC LIMIT ?2
             ) ORDER BY ord ASC",
            MESSAGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![message_id, limit as i64], message_from_row)?;
        collect(rows)
    }

    /// Latest `limit` live messages of a chat, oldest first.
    pub async fn list_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<Message>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM (
                SELECT * FROM messages WHERE chat_id = ?1 AND is_deleted = 0
                ORDER BY seq DESC LIMIT ?2
             ) ORDER BY seq ASC",
            MESSAGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![chat_id, limit as i64], message_from_row)?;
        collect(rows)
    }

    /// AI replies awaiting validation in every chat the user takes part in.
    pub async fn list_unvalidated_for_user(&self, user_id: &str) -> Result<Vec<Message>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM messages
             WHERE sender_kind = 'ai_persona' AND ai_validated = 0 AND is_deleted = 0
               AND chat_id IN (
                   SELECT c.id FROM chats c, json_each(c.participants) p WHERE p.value = ?1
               )
             ORDER BY seq ASC",
            MESSAGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id], message_from_row)?;
        collect(rows)
    }

    /// Marks a message validated, replacing its content when an edit is given.
    pub async fn validate_message(&self, id: &str, edited: Option<&str>) -> Result<Option<Message>> {
        {
            let db = self.db.lock().await;
            let now = Utc::now();
            match edited {
                Some(content) => db.execute(
                    "UPDATE messages SET ai_validated = 1, ai_edited = 1, content = ?2, updated_at = ?3
                     WHERE id = ?1",
                    params![id, content, now],
                )?,
                None => db.execute(
                    "UPDATE messages SET ai_validated = 1, updated_at = ?2 WHERE id = ?1",
                    params![id, now],
                )?,
            };
        }
        self.get_message(id).await
    }

    pub async fn soft_delete_message(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let updated = db.execute(
            "UPDATE messages SET is_deleted = 1, updated_at = ?2 WHERE id = ?1",
            params![id, Utc::now()],
        )?;
        Ok(updated > 0)
    }
}
