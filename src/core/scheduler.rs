use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::agent::{AgentDispatcher, ToolContext};
use crate::core::calendar::CalendarEngine;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::llm::ChatMessage;
use crate::core::models::CalendarEvent;
use crate::core::notify::NotificationOrchestrator;
use crate::core::store::Store;

const NOTICE_TEMPERATURE: f32 = 0.5;
const NOTICE_MAX_TOKENS: u32 = 512;

pub fn fallback_notice(event: &CalendarEvent) -> String {
    match event.description.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(description) => format!("Reminder: {}\n{}", event.title, description),
        None => format!("Reminder: {}", event.title),
    }
}

fn proactive_prompt(event: &CalendarEvent) -> String {
    let mut prompt = format!("The scheduled calendar event \"{}\" has just fired.", event.title);
    if let Some(description) = event.description.as_deref() {
        prompt.push_str(&format!("\nDetails: {}", description));
    }
    prompt.push_str("\nWrite a short notice to the user about it.");
    prompt
}

struct Poller {
    calendar: Arc<CalendarEngine>,
    store: Store,
    dispatcher: Option<Arc<AgentDispatcher>>,
    notifier: Arc<NotificationOrchestrator>,
}

impl Poller {
    /// One poll cycle over the events due at `now`. Each event is stamped with
    /// the time it is actually processed. Failures are logged and never stop
    /// the loop.
    async fn process_due_events(&self, now: DateTime<Utc>) -> usize {
        let due = match self.calendar.get_due(now).await {
            Ok(due) => due,
            Err(e) => {
                error!("Scheduler poll failed: {}", e);
                return 0;
            }
        };
        if due.is_empty() {
            debug!("No due events");
            return 0;
        }

        info!("Processing {} due event(s)", due.len());
        let mut processed = 0;
        for event in due {
            match self.process_event(&event).await {
                Ok(()) => processed += 1,
                Err(e) => error!("Event {} ('{}') failed: {}", event.id, event.title, e),
            }
        }
        processed
    }

    async fn process_event(&self, event: &CalendarEvent) -> Result<()> {
        // Committed first so a failed delivery can never cause a re-fire.
        let fired = self.calendar.mark_triggered(event).await?;
        info!(
            "Event '{}' fired (count {}), next {:?}",
            fired.title, fired.trigger_count, fired.next_trigger_at
        );

        let Some(user_id) = fired.created_by_user_id.as_deref() else {
            debug!("Event {} has no creator to notify", fired.id);
            return Ok(());
        };
        let content = self.notice_for(&fired).await;
        let delivered = self
            .notifier
            .deliver(user_id, &content, Some(&fired.id), Some(&fired.role_id))
            .await;
        if !delivered {
            warn!("Notice for event {} was not delivered to {}", fired.id, user_id);
        }
        Ok(())
    }

    async fn notice_for(&self, event: &CalendarEvent) -> String {
        let Some(dispatcher) = &self.dispatcher else {
            return fallback_notice(event);
        };
        let role = match self.store.get_role(&event.role_id).await {
            Ok(Some(role)) if role.is_active => role,
            Ok(_) => {
                warn!("Role {} unavailable for event {}", event.role_id, event.id);
                return fallback_notice(event);
            }
            Err(e) => {
                warn!("Role lookup for event {} failed: {}", event.id, e);
                return fallback_notice(event);
            }
        };

        let ctx = ToolContext {
            user_id: event.created_by_user_id.clone(),
            ..ToolContext::for_role(&role)
        };
        let result = dispatcher
            .execute_in(
                &role,
                vec![ChatMessage::user(proactive_prompt(event))],
                NOTICE_TEMPERATURE,
                NOTICE_MAX_TOKENS,
                &ctx,
            )
            .await;
        if result.is_success() && !result.content.trim().is_empty() {
            result.content
        } else {
            fallback_notice(event)
        }
    }
}

/// Background loop that fires due calendar events: `stopped -> running` on
/// `start`, back on `stop`, which waits for the task to finish.
pub struct Scheduler {
    poller: Arc<Poller>,
    poll_interval: Duration,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(
        calendar: Arc<CalendarEngine>,
        store: Store,
        dispatcher: Option<Arc<AgentDispatcher>>,
        notifier: Arc<NotificationOrchestrator>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            poller: Arc::new(Poller {
                calendar,
                store,
                dispatcher,
                notifier,
            }),
            poll_interval,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn start(&mut self) {
        if self.running.is_some() {
            warn!("Scheduler already running");
            return;
        }
        let token = CancellationToken::new();
        let cancel = token.clone();
        let poller = self.poller.clone();
        let interval = self.poll_interval;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    processed = poller.process_due_events(Utc::now()) => {
                        if processed > 0 {
                            info!("Scheduler cycle processed {} event(s)", processed);
                        }
                    }
                }
            }
            debug!("Scheduler loop exited");
        });

        info!("Scheduler started (poll every {:?})", interval);
        self.running = Some((token, handle));
    }

    pub async fn stop(&mut self) {
        let Some((token, handle)) = self.running.take() else {
            return;
        };
        token.cancel();
        if let Err(e) = handle.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
        info!("Scheduler stopped");
    }

    /// Runs a single cycle immediately and returns how many events fired.
    pub async fn run_once(&self, now: DateTime<Utc>) -> usize {
        self.poller.process_due_events(now).await
    }
}

#[async_trait::async_trait]
impl LifecycleComponent for Scheduler {
    async fn on_start(&mut self) -> Result<()> {
        self.start();
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        self.stop().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::ToolRegistry;
    use crate::core::models::NewCalendarEvent;
    use crate::core::testing::{RecordingSender, ScriptedProvider, Seeded, dispatcher_with};
    use std::sync::Mutex;

    struct Rig {
        seeded: Seeded,
        calendar: Arc<CalendarEngine>,
        journal: Arc<Mutex<Vec<String>>>,
        notifier: Arc<NotificationOrchestrator>,
        user_id: String,
        role_id: String,
    }

    async fn rig(sender_succeeds: bool) -> Rig {
        let seeded = Seeded::new().await;
        let role = seeded.role("assistant", "You remind people.").await;
        let ann = seeded.user("ann").await;

        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = NotificationOrchestrator::new(seeded.store.clone());
        notifier.register_sender(Arc::new(RecordingSender::new(
            "email",
            sender_succeeds,
            journal.clone(),
        )));
        notifier
            .register_channel(&ann.id, &seeded.org.id, "email", serde_json::json!({}), 1)
            .await
            .unwrap();
        notifier.verify_channel(&ann.id, "email").await.unwrap();

        Rig {
            calendar: Arc::new(CalendarEngine::new(seeded.store.clone())),
            seeded,
            journal,
            notifier: Arc::new(notifier),
            user_id: ann.id,
            role_id: role.id,
        }
    }

    fn scheduler(rig: &Rig, dispatcher: Option<Arc<AgentDispatcher>>, interval: Duration) -> Scheduler {
        Scheduler::new(
            rig.calendar.clone(),
            rig.seeded.store.clone(),
            dispatcher,
            rig.notifier.clone(),
            interval,
        )
    }

    async fn due_event(rig: &Rig, title: &str, description: Option<&str>) -> CalendarEvent {
        let mut new = NewCalendarEvent::one_time(
            &rig.role_id,
            &rig.seeded.org.id,
            title,
            Utc::now() - chrono::Duration::minutes(1),
        )
        .created_by(&rig.user_id);
        new.description = description.map(str::to_string);
        rig.calendar.create(new).await.unwrap()
    }

    #[test]
    fn fallback_notice_includes_description_when_present() {
        let mut event = NewCalendarEvent::one_time("r", "o", "Call bank", Utc::now());
        event.description = Some("ask about fees".to_string());
        let stored = CalendarEvent {
            id: "e".to_string(),
            role_id: "r".to_string(),
            org_id: "o".to_string(),
            title: event.title.clone(),
            description: event.description.clone(),
            kind: event.kind,
            scheduled_at: event.scheduled_at,
            cron_expression: None,
            next_trigger_at: event.scheduled_at,
            last_triggered_at: None,
            trigger_count: 0,
            created_by_user_id: None,
            source_chat_id: None,
            source_message_id: None,
            metadata: serde_json::json!({}),
            is_active: true,
            created_at: Utc::now(),
        };
        assert_eq!(fallback_notice(&stored), "Reminder: Call bank\nask about fees");
        let bare = CalendarEvent {
            description: None,
            ..stored
        };
        assert_eq!(fallback_notice(&bare), "Reminder: Call bank");
    }

    #[tokio::test]
    async fn dispatcher_text_becomes_the_notice() {
        let rig = rig(true).await;
        let llm = Arc::new(ScriptedProvider::replying(&["Your contract review starts now."]));
        let sched = scheduler(&rig, Some(dispatcher_with(llm.clone(), ToolRegistry::new())), Duration::from_secs(60));
        let event = due_event(&rig, "Contract review", None).await;

        assert_eq!(sched.run_once(Utc::now()).await, 1);
        assert_eq!(
            *rig.journal.lock().unwrap(),
            vec!["email:Your contract review starts now.".to_string()]
        );
        let request = &llm.requests()[0];
        assert_eq!(request.temperature, NOTICE_TEMPERATURE);
        assert_eq!(request.max_tokens, NOTICE_MAX_TOKENS);
        assert!(request.messages[0].content.contains("Contract review"));

        let log = rig.notifier.delivery_log(&rig.user_id, 5).await.unwrap();
        assert_eq!(log[0].event_id.as_deref(), Some(event.id.as_str()));
        assert_eq!(log[0].role_id.as_deref(), Some(rig.role_id.as_str()));
    }

    #[tokio::test]
    async fn dispatcher_failure_falls_back_to_plain_reminder() {
        let rig = rig(true).await;
        let llm = Arc::new(ScriptedProvider::new());
        llm.push_error("model offline");
        let sched = scheduler(&rig, Some(dispatcher_with(llm, ToolRegistry::new())), Duration::from_secs(60));
        due_event(&rig, "Pay rent", Some("Landlord account")).await;

        assert_eq!(sched.run_once(Utc::now()).await, 1);
        assert_eq!(
            *rig.journal.lock().unwrap(),
            vec!["email:Reminder: Pay rent\nLandlord account".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_delivery_does_not_refire() {
        let rig = rig(false).await;
        let sched = scheduler(&rig, None, Duration::from_secs(60));
        let event = due_event(&rig, "Pay rent", None).await;

        assert_eq!(sched.run_once(Utc::now()).await, 1);
        assert_eq!(sched.run_once(Utc::now()).await, 0);

        let stored = rig.calendar.get(&event.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.trigger_count, 1);
        assert_eq!(rig.journal.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn events_without_creator_fire_silently() {
        let rig = rig(true).await;
        let sched = scheduler(&rig, None, Duration::from_secs(60));
        let event = rig
            .calendar
            .create(NewCalendarEvent::one_time(
                &rig.role_id,
                &rig.seeded.org.id,
                "Orphan",
                Utc::now() - chrono::Duration::seconds(5),
            ))
            .await
            .unwrap();

        assert_eq!(sched.run_once(Utc::now()).await, 1);
        assert!(rig.journal.lock().unwrap().is_empty());
        assert!(!rig.calendar.get(&event.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn recurring_event_stays_active_after_firing() {
        let rig = rig(true).await;
        let sched = scheduler(&rig, None, Duration::from_secs(60));
        let created = Utc::now() - chrono::Duration::hours(2);
        let event = rig
            .calendar
            .create_at(
                NewCalendarEvent::recurring(&rig.role_id, &rig.seeded.org.id, "Hourly", "0 * * * *")
                    .created_by(&rig.user_id),
                created,
            )
            .await
            .unwrap();

        let now = Utc::now();
        assert_eq!(sched.run_once(now).await, 1);
        let stored = rig.calendar.get(&event.id).await.unwrap().unwrap();
        assert!(stored.is_active);
        assert!(stored.next_trigger_at.unwrap() > now);
    }

    #[tokio::test]
    async fn recurring_fire_is_stamped_when_processed() {
        let rig = rig(true).await;
        let sched = scheduler(&rig, None, Duration::from_secs(60));
        let event = rig
            .calendar
            .create_at(
                NewCalendarEvent::recurring(&rig.role_id, &rig.seeded.org.id, "New year", "0 0 1 1 *")
                    .created_by(&rig.user_id),
                Utc::now() - chrono::Duration::days(800),
            )
            .await
            .unwrap();

        // The cycle started long ago; the occurrence after it has also passed.
        let cycle_start = event.next_trigger_at.unwrap();
        let before = Utc::now();
        assert_eq!(sched.run_once(cycle_start).await, 1);

        let stored = rig.calendar.get(&event.id).await.unwrap().unwrap();
        assert!(stored.last_triggered_at.unwrap() >= before);
        assert!(stored.next_trigger_at.unwrap() > before);
        assert_eq!(sched.run_once(Utc::now()).await, 0);
        assert_eq!(rig.journal.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_event_does_not_block_the_rest_of_the_cycle() {
        let rig = rig(true).await;
        let sched = scheduler(&rig, None, Duration::from_secs(60));
        let broken = rig
            .calendar
            .create(
                NewCalendarEvent::one_time(
                    &rig.role_id,
                    &rig.seeded.org.id,
                    "Broken",
                    Utc::now() - chrono::Duration::minutes(5),
                )
                .created_by(&rig.user_id),
            )
            .await
            .unwrap();
        let healthy = due_event(&rig, "Pay rent", None).await;
        rig.seeded
            .store
            .execute_batch(
                "CREATE TRIGGER reject_broken BEFORE UPDATE ON calendar_events
                 WHEN OLD.title = 'Broken'
                 BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
            )
            .await
            .unwrap();

        assert_eq!(sched.run_once(Utc::now()).await, 1);
        assert_eq!(*rig.journal.lock().unwrap(), vec!["email:Reminder: Pay rent".to_string()]);

        let broken = rig.calendar.get(&broken.id).await.unwrap().unwrap();
        assert!(broken.is_active);
        assert_eq!(broken.trigger_count, 0);
        let healthy = rig.calendar.get(&healthy.id).await.unwrap().unwrap();
        assert!(!healthy.is_active);
        assert_eq!(healthy.trigger_count, 1);
    }

    #[tokio::test]
    async fn start_and_stop_run_the_background_loop() {
        let rig = rig(true).await;
        let mut sched = scheduler(&rig, None, Duration::from_millis(10));
        let event = due_event(&rig, "Tick", None).await;

        assert!(!sched.is_running());
        sched.start();
        assert!(sched.is_running());

        for _ in 0..100 {
            if !rig.journal.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sched.stop().await;
        assert!(!sched.is_running());

        assert_eq!(*rig.journal.lock().unwrap(), vec!["email:Reminder: Tick".to_string()]);
        assert!(!rig.calendar.get(&event.id).await.unwrap().unwrap().is_active);

        // Stopping twice is harmless.
        sched.stop().await;
    }
}
