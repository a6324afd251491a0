use anyhow::Result;
use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::{Store, enum_column, json_column};
use crate::core::models::{DeliveryStatus, NotificationChannel, NotificationLog, new_id};

const CHANNEL_COLUMNS: &str =
    "id, user_id, org_id, channel_kind, config, is_enabled, is_verified, priority, created_at";
const LOG_COLUMNS: &str = "id, user_id, channel_kind, event_id, role_id, content, status, \
     attempts, error_message, created_at, sent_at";

fn channel_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationChannel> {
    Ok(NotificationChannel {
        id: row.get(0)?,
        user_id: row.get(1)?,
        org_id: row.get(2)?,
        channel_kind: row.get(3)?,
        config: json_column(row, 4)?,
        is_enabled: row.get(5)?,
        is_verified: row.get(6)?,
        priority: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn log_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationLog> {
    Ok(NotificationLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        channel_kind: row.get(2)?,
        event_id: row.get(3)?,
        role_id: row.get(4)?,
        content: row.get(5)?,
        status: enum_column(row, 6, DeliveryStatus::from_status)?,
        attempts: row.get(7)?,
        error_message: row.get(8)?,
        created_at: row.get(9)?,
        sent_at: row.get(10)?,
    })
}

impl Store {
    /// Inserts or replaces the user's channel of that kind and re-enables it.
    /// Verification is preserved when the existing row was already verified.
    pub async fn upsert_channel(&self, channel: &NotificationChannel) -> Result<NotificationChannel> {
        {
            let db = self.db.lock().await;
            db.execute(
                "INSERT INTO notification_channels
                    (id, user_id, org_id, channel_kind, config, is_enabled, is_verified, priority, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8)
                 ON CONFLICT(user_id, channel_kind) DO UPDATE SET
                    config = excluded.config,
                    priority = excluded.priority,
                    is_enabled = 1,
                    is_verified = notification_channels.is_verified OR excluded.is_verified",
                params![
                    channel.id,
                    channel.user_id,
                    channel.org_id,
                    channel.channel_kind,
                    serde_json::to_string(&channel.config)?,
                    channel.is_verified,
                    channel.priority,
                    channel.created_at
                ],
            )?;
        }
        self.get_channel(&channel.user_id, &channel.channel_kind)
            .await?
            .ok_or_else(|| anyhow::anyhow!("channel {} vanished after upsert", channel.channel_kind))
    }

    pub async fn get_channel(&self, user_id: &str, kind: &str) -> Result<Option<NotificationChannel>> {
        let db = self.db.lock().await;
        let channel = db
            .query_row(
                &format!(
                    "SELECT {} FROM notification_channels WHERE user_id = ?1 AND channel_kind = ?2",
                    CHANNEL_COLUMNS
                ),
                params![user_id, kind],
                channel_from_row,
            )
            .optional()?;
        Ok(channel)
    }

    /// Channels ordered by priority, highest first.
    pub async fn list_channels(&self, user_id: &str, enabled_only: bool) -> Result<Vec<NotificationChannel>> {
        let db = self.db.lock().await;
        let filter = if enabled_only { " AND is_enabled = 1" } else { "" };
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM notification_channels WHERE user_id = ?1{} ORDER BY priority DESC, created_at ASC",
            CHANNEL_COLUMNS, filter
        ))?;
        let rows = stmt.query_map(params![user_id], channel_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub async fn set_channel_verified(&self, user_id: &str, kind: &str, verified: bool) -> Result<bool> {
        let db = self.db.lock().await;
        let updated = db.execute(
            "UPDATE notification_channels SET is_verified = ?3 WHERE user_id = ?1 AND channel_kind = ?2",
            params![user_id, kind, verified],
        )?;
        Ok(updated > 0)
    }

    pub async fn set_channel_enabled(&self, user_id: &str, kind: &str, enabled: bool) -> Result<bool> {
        let db = self.db.lock().await;
        let updated = db.execute(
            "UPDATE notification_channels SET is_enabled = ?3 WHERE user_id = ?1 AND channel_kind = ?2",
            params![user_id, kind, enabled],
        )?;
        Ok(updated > 0)
    }

    pub async fn delete_channel(&self, user_id: &str, kind: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let deleted = db.execute(
            "DELETE FROM notification_channels WHERE user_id = ?1 AND channel_kind = ?2",
            params![user_id, kind],
        )?;
        Ok(deleted > 0)
    }

    /// Opens a `pending` log row for one delivery attempt and returns its id.
    pub async fn open_delivery_log(
        &self,
        user_id: &str,
        channel_kind: &str,
        content: &str,
        event_id: Option<&str>,
        role_id: Option<&str>,
    ) -> Result<String> {
        let id = new_id();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO notification_log
                (id, user_id, channel_kind, event_id, role_id, content, status, attempts, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
            params![
                id,
                user_id,
                channel_kind,
                event_id,
                role_id,
                content,
                DeliveryStatus::Pending.as_str(),
                Utc::now()
            ],
        )?;
        Ok(id)
    }

    /// Closes a log row as `sent` or `failed`, counting the attempt.
    pub async fn close_delivery_log(&self, id: &str, status: DeliveryStatus, error: Option<&str>) -> Result<()> {
        let sent_at = (status == DeliveryStatus::Sent).then(Utc::now);
        let db = self.db.lock().await;
        db.execute(
            "UPDATE notification_log SET status = ?2, attempts = attempts + 1, error_message = ?3, sent_at = ?4
             WHERE id = ?1",
            params![id, status.as_str(), error, sent_at],
        )?;
        Ok(())
    }

    /// Most recent first.
    pub async fn list_delivery_log(&self, user_id: &str, limit: usize) -> Result<Vec<NotificationLog>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM notification_log WHERE user_id = ?1 ORDER BY seq DESC LIMIT ?2",
            LOG_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id, limit as i64], log_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
