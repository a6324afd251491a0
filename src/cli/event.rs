use anyhow::{Result, anyhow};

use super::EventArgs;
use crate::core::calendar::parse_event_date;
use crate::core::config::AppConfig;
use crate::core::engine::Engine;
use crate::core::models::NewCalendarEvent;
use crate::core::terminal;

pub async fn run_event(config: AppConfig, args: EventArgs) -> Result<()> {
    let engine = Engine::build(config).await?;
    let role = engine
        .store
        .get_role(&args.role)
        .await?
        .ok_or_else(|| anyhow!("role {} not found", args.role))?;

    let mut new = match (&args.at, &args.cron) {
        (Some(at), None) => {
            let at = parse_event_date(at).ok_or_else(|| anyhow!("cannot parse date '{}'", at))?;
            NewCalendarEvent::one_time(&role.id, &role.org_id, &args.title, at)
        }
        (None, Some(cron)) => NewCalendarEvent::recurring(&role.id, &role.org_id, &args.title, cron),
        _ => return Err(anyhow!("event needs exactly one of --at or --cron")),
    };
    if let Some(description) = &args.description {
        new = new.description(description);
    }
    if let Some(user) = &args.user {
        new = new.created_by(user);
    }

    let event = engine.calendar.create(new).await?;
    terminal::print_success(&format!("Created event {}", event.id));
    terminal::print_status("Role", &role.code);
    terminal::print_status(
        "Next trigger",
        &event
            .next_trigger_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string()),
    );
    Ok(())
}
