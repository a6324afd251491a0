use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{Tool, ToolContext, required_str};
use crate::core::calendar::{CalendarEngine, EventSource};

/// Lets a role put a one-time reminder on its own calendar.
pub struct CalendarCreateTool {
    calendar: Arc<CalendarEngine>,
}

impl CalendarCreateTool {
    pub fn new(calendar: Arc<CalendarEngine>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Tool for CalendarCreateTool {
    fn name(&self) -> &str {
        "calendar_create"
    }

    fn description(&self) -> &str {
        "Schedule a one-time reminder. The date is ISO 8601, e.g. 2025-03-01T14:00:00Z."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "date": {"type": "string", "description": "ISO 8601 date or date-time"},
                "description": {"type": "string"}
            },
            "required": ["title", "date"]
        })
    }

    async fn call(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let title = required_str(&args, "title")?;
        let date = required_str(&args, "date")?;
        let description = args.get("description").and_then(|v| v.as_str());

        let source = EventSource {
            chat_id: ctx.chat_id.clone(),
            message_id: ctx.message_id.clone(),
            user_id: ctx.user_id.clone(),
        };
        let event = self
            .calendar
            .create_from_ai_detection(&ctx.role_id, &ctx.org_id, title, date, description, source)
            .await?;

        let when = event
            .next_trigger_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        Ok(format!("Scheduled '{}' for {} (id {})", event.title, when, event.id))
    }
}

/// Lists the organization's upcoming active events.
pub struct CalendarQueryTool {
    calendar: Arc<CalendarEngine>,
}

impl CalendarQueryTool {
    pub fn new(calendar: Arc<CalendarEngine>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Tool for CalendarQueryTool {
    fn name(&self) -> &str {
        "calendar_query"
    }

    fn description(&self) -> &str {
        "List upcoming scheduled events for this organization."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "minimum": 1, "maximum": 10}
            }
        })
    }

    async fn call(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(10)
            .clamp(1, 10) as usize;

        let events = self.calendar.upcoming(&ctx.org_id, Utc::now(), limit).await?;
        if events.is_empty() {
            return Ok("No upcoming events.".to_string());
        }
        let lines: Vec<String> = events
            .iter()
            .map(|e| {
                let when = e.next_trigger_at.map(|t| t.to_rfc3339()).unwrap_or_default();
                match &e.cron_expression {
                    Some(cron) => format!("- {} at {} (repeats: {})", e.title, when, cron),
                    None => format!("- {} at {}", e.title, when),
                }
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
