use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use croner::Cron;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::core::models::{CalendarEvent, EventKind, EventUpdate, NewCalendarEvent, new_id};
use crate::core::store::Store;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("event title must not be empty")]
    EmptyTitle,
    #[error("one_time events require scheduled_at")]
    MissingScheduledAt,
    #[error("recurring events require a cron expression")]
    MissingCron,
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },
    #[error("could not parse date '{0}'")]
    InvalidDate(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Where an AI-detected event came from.
#[derive(Debug, Clone, Default)]
pub struct EventSource {
    pub chat_id: Option<String>,
    pub message_id: Option<String>,
    pub user_id: Option<String>,
}

/// Next cron fire time strictly after `after`, evaluated in UTC.
pub fn next_occurrence(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, CalendarError> {
    let invalid = |reason: String| CalendarError::InvalidCron {
        expr: expr.to_string(),
        reason,
    };
    let cron = Cron::new(expr.trim())
        .parse()
        .map_err(|e| invalid(format!("{}", e)))?;
    cron.find_next_occurrence(&after, false)
        .map_err(|e| invalid(format!("{}", e)))
}

/// Accepts RFC 3339, naive date-times (taken as UTC) and bare dates (09:00 UTC).
pub fn parse_event_date(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let nine = NaiveTime::from_hms_opt(9, 0, 0)?;
    Some(date.and_time(nine).and_utc())
}

pub struct CalendarEngine {
    store: Store,
}

impl CalendarEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn create(&self, new: NewCalendarEvent) -> Result<CalendarEvent, CalendarError> {
        self.create_at(new, Utc::now()).await
    }

    /// Validates and stores a new event; `now` anchors the first cron occurrence.
    pub async fn create_at(
        &self,
        new: NewCalendarEvent,
        now: DateTime<Utc>,
    ) -> Result<CalendarEvent, CalendarError> {
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(CalendarError::EmptyTitle);
        }

        let (scheduled_at, cron_expression, next_trigger_at) = match new.kind {
            EventKind::OneTime => {
                let at = new.scheduled_at.ok_or(CalendarError::MissingScheduledAt)?;
                (Some(at), None, Some(at))
            }
            EventKind::Recurring => {
                let expr = new
                    .cron_expression
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .ok_or(CalendarError::MissingCron)?;
                let next = next_occurrence(&expr, now)?;
                (None, Some(expr), Some(next))
            }
        };

        let event = CalendarEvent {
            id: new_id(),
            role_id: new.role_id,
            org_id: new.org_id,
            title,
            description: new.description,
            kind: new.kind,
            scheduled_at,
            cron_expression,
            next_trigger_at,
            last_triggered_at: None,
            trigger_count: 0,
            created_by_user_id: new.created_by_user_id,
            source_chat_id: new.source_chat_id,
            source_message_id: new.source_message_id,
            metadata: new.metadata,
            is_active: true,
            created_at: now,
        };
        self.store.insert_event(&event).await?;
        info!(
            "Created {} event '{}' ({}), next trigger {:?}",
            event.kind.as_str(),
            event.title,
            event.id,
            event.next_trigger_at
        );
        Ok(event)
    }

    /// A one-time event detected in conversation, e.g. by the `calendar_create` tool.
    pub async fn create_from_ai_detection(
        &self,
        role_id: &str,
        org_id: &str,
        title: &str,
        date_str: &str,
        description: Option<&str>,
        source: EventSource,
    ) -> Result<CalendarEvent, CalendarError> {
        let at = parse_event_date(date_str)
            .ok_or_else(|| CalendarError::InvalidDate(date_str.to_string()))?;

        let mut new = NewCalendarEvent::one_time(role_id, org_id, title, at);
        new.description = description.map(str::to_string);
        new.created_by_user_id = source.user_id;
        new.source_chat_id = source.chat_id;
        new.source_message_id = source.message_id;
        new.metadata = serde_json::json!({
            "detected_by_ai": true,
            "original_date_str": date_str,
        });
        self.create(new).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<CalendarEvent>> {
        self.store.get_event(id).await
    }

    pub async fn get_due(&self, now: DateTime<Utc>) -> Result<Vec<CalendarEvent>> {
        self.store.due_events(now).await
    }

    pub async fn mark_triggered(&self, event: &CalendarEvent) -> Result<CalendarEvent> {
        self.mark_triggered_at(event, Utc::now()).await
    }

    /// Records a fire at `now`. Recurring events move to the next occurrence
    /// strictly after `now` (missed runs are not replayed); one-time events
    /// are retired.
    pub async fn mark_triggered_at(
        &self,
        event: &CalendarEvent,
        now: DateTime<Utc>,
    ) -> Result<CalendarEvent> {
        let mut updated = event.clone();
        updated.trigger_count += 1;
        updated.last_triggered_at = Some(now);

        match updated.kind {
            EventKind::OneTime => {
                updated.is_active = false;
                updated.next_trigger_at = None;
            }
            EventKind::Recurring => {
                let next = updated
                    .cron_expression
                    .as_deref()
                    .ok_or(CalendarError::MissingCron)
                    .and_then(|expr| next_occurrence(expr, now));
                match next {
                    Ok(next) => updated.next_trigger_at = Some(next),
                    Err(e) => {
                        error!("Deactivating event {}: {}", updated.id, e);
                        updated.is_active = false;
                        updated.next_trigger_at = None;
                    }
                }
            }
        }

        self.store.update_event(&updated).await?;
        Ok(updated)
    }

    pub async fn update(
        &self,
        id: &str,
        changes: EventUpdate,
    ) -> Result<Option<CalendarEvent>, CalendarError> {
        let Some(mut event) = self.store.get_event(id).await? else {
            return Ok(None);
        };
        let now = Utc::now();

        if let Some(title) = changes.title {
            if title.trim().is_empty() {
                return Err(CalendarError::EmptyTitle);
            }
            event.title = title.trim().to_string();
        }
        if let Some(description) = changes.description {
            event.description = Some(description);
        }
        if let Some(active) = changes.is_active {
            event.is_active = active;
        }

        match event.kind {
            EventKind::OneTime => {
                if let Some(at) = changes.scheduled_at {
                    event.scheduled_at = Some(at);
                }
                if event.is_active {
                    event.next_trigger_at = event.scheduled_at;
                }
            }
            EventKind::Recurring => {
                if let Some(expr) = changes.cron_expression {
                    let expr = expr.trim().to_string();
                    if expr.is_empty() {
                        return Err(CalendarError::MissingCron);
                    }
                    next_occurrence(&expr, now)?;
                    event.cron_expression = Some(expr);
                }
                if event.is_active
                    && let Some(expr) = event.cron_expression.as_deref()
                {
                    event.next_trigger_at = Some(next_occurrence(expr, now)?);
                }
            }
        }

        self.store.update_event(&event).await?;
        Ok(Some(event))
    }

    pub async fn deactivate(&self, id: &str) -> Result<bool> {
        let Some(mut event) = self.store.get_event(id).await? else {
            warn!("Cannot deactivate unknown event {}", id);
            return Ok(false);
        };
        event.is_active = false;
        event.next_trigger_at = None;
        self.store.update_event(&event).await?;
        Ok(true)
    }

    pub async fn list_by_org(&self, org_id: &str, active_only: bool) -> Result<Vec<CalendarEvent>> {
        self.store.list_events_by_org(org_id, active_only).await
    }

    pub async fn list_by_role(&self, role_id: &str, active_only: bool) -> Result<Vec<CalendarEvent>> {
        self.store.list_events_by_role(role_id, active_only).await
    }

    /// Active events of the org with a pending trigger at or after `now`, soonest first.
    pub async fn upcoming(
        &self,
        org_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CalendarEvent>> {
        let mut events: Vec<CalendarEvent> = self
            .store
            .list_events_by_org(org_id, true)
            .await?
            .into_iter()
            .filter(|e| e.next_trigger_at.is_some_and(|t| t >= now))
            .collect();
        events.sort_by_key(|e| e.next_trigger_at);
        events.truncate(limit);
        Ok(events)
    }
}
