use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use super::{Store, enum_column, json_column};
use crate::core::models::{CalendarEvent, EventKind};

const EVENT_COLUMNS: &str = "id, role_id, org_id, title, description, kind, scheduled_at, \
     cron_expression, next_trigger_at, last_triggered_at, trigger_count, created_by_user_id, \
     source_chat_id, source_message_id, metadata, is_active, created_at";

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CalendarEvent> {
    Ok(CalendarEvent {
        id: row.get(0)?,
        role_id: row.get(1)?,
        org_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        kind: enum_column(row, 5, EventKind::from_kind)?,
        scheduled_at: row.get(6)?,
        cron_expression: row.get(7)?,
        next_trigger_at: row.get(8)?,
        last_triggered_at: row.get(9)?,
        trigger_count: row.get(10)?,
        created_by_user_id: row.get(11)?,
        source_chat_id: row.get(12)?,
        source_message_id: row.get(13)?,
        metadata: json_column(row, 14)?,
        is_active: row.get(15)?,
        created_at: row.get(16)?,
    })
}

impl Store {
    pub async fn insert_event(&self, event: &CalendarEvent) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            &format!(
                "INSERT INTO calendar_events ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                EVENT_COLUMNS
            ),
            params![
                event.id,
                event.role_id,
                event.org_id,
                event.title,
                event.description,
                event.kind.as_str(),
                event.scheduled_at,
                event.cron_expression,
                event.next_trigger_at,
                event.last_triggered_at,
                event.trigger_count,
                event.created_by_user_id,
                event.source_chat_id,
                event.source_message_id,
                serde_json::to_string(&event.metadata)?,
                event.is_active,
                event.created_at
            ],
        )?;
        Ok(())
    }

    /// Rewrites every mutable column of an existing event.
    pub async fn update_event(&self, event: &CalendarEvent) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE calendar_events SET
                title = ?2, description = ?3, scheduled_at = ?4, cron_expression = ?5,
                next_trigger_at = ?6, last_triggered_at = ?7, trigger_count = ?8,
                metadata = ?9, is_active = ?10
             WHERE id = ?1",
            params![
                event.id,
                event.title,
                event.description,
                event.scheduled_at,
                event.cron_expression,
                event.next_trigger_at,
                event.last_triggered_at,
                event.trigger_count,
                serde_json::to_string(&event.metadata)?,
                event.is_active
            ],
        )?;
        Ok(())
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<CalendarEvent>> {
        let db = self.db.lock().await;
        let event = db
            .query_row(
                &format!("SELECT {} FROM calendar_events WHERE id = ?1", EVENT_COLUMNS),
                params![id],
                event_from_row,
            )
            .optional()?;
        Ok(event)
    }

    /// Active events whose `next_trigger_at` is at or before `now`, soonest first.
    /// Timestamps are stored as UTC text, which orders chronologically.
    pub async fn due_events(&self, now: DateTime<Utc>) -> Result<Vec<CalendarEvent>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM calendar_events
             WHERE is_active = 1 AND next_trigger_at IS NOT NULL AND next_trigger_at <= ?1
             ORDER BY next_trigger_at ASC",
            EVENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![now], event_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub async fn list_events_by_org(&self, org_id: &str, active_only: bool) -> Result<Vec<CalendarEvent>> {
        self.list_events_where("org_id", org_id, active_only).await
    }

    pub async fn list_events_by_role(&self, role_id: &str, active_only: bool) -> Result<Vec<CalendarEvent>> {
        self.list_events_where("role_id", role_id, active_only).await
    }

    async fn list_events_where(
        &self,
        column: &str,
        value: &str,
        active_only: bool,
    ) -> Result<Vec<CalendarEvent>> {
        let db = self.db.lock().await;
        let filter = if active_only { " AND is_active = 1" } else { "" };
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM calendar_events WHERE {} = ?1{} ORDER BY created_at ASC",
            EVENT_COLUMNS, column, filter
        ))?;
        let rows = stmt.query_map(params![value], event_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
