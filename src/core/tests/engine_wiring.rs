//! Wiring checks over a fully assembled engine: a role books a reminder
//! through the calendar tool and the scheduler later delivers it.

use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};

use crate::core::config::AppConfig;
use crate::core::engine::Engine;
use crate::core::lifecycle::LifecycleState;
use crate::core::models::{ChatKind, DeliveryStatus, Role, User};
use crate::core::notify::NotificationOrchestrator;
use crate::core::store::Store;
use crate::core::testing::{RecordingSender, ScriptedProvider};

#[tokio::test]
async fn reminder_booked_in_chat_is_delivered_by_the_scheduler() {
    let store = Store::open_in_memory().unwrap();
    let journal = Arc::new(Mutex::new(Vec::new()));
    let mut notifier = NotificationOrchestrator::new(store.clone());
    notifier.register_sender(Arc::new(RecordingSender::new("email", true, journal.clone())));

    let llm = Arc::new(ScriptedProvider::new());
    let engine = Engine::assemble(AppConfig::default(), store.clone(), llm.clone(), notifier);

    let org = crate::core::models::Organization::new("Acme", "acme");
    store.insert_organization(&org).await.unwrap();
    let mut assistant = Role::new(&org.id, "assistant", "You keep the diary.");
    assistant.tool_names = vec!["calendar_create".to_string(), "calendar_query".to_string()];
    store.insert_role(&assistant).await.unwrap();
    let ann = User::new(&org.id, "ann");
    store.insert_user(&ann).await.unwrap();
    store
        .insert_user(&User::new(&org.id, "diary").with_role(&assistant.id))
        .await
        .unwrap();
    engine
        .notifier
        .register_channel(&ann.id, &org.id, "email", serde_json::json!({"email": "ann@example.com"}), 0)
        .await
        .unwrap();
    engine.notifier.verify_channel(&ann.id, "email").await.unwrap();

    let chat = engine
        .chat
        .create_chat(&org.id, ChatKind::Main, Some("general"), Vec::new(), Some(&ann.id))
        .await
        .unwrap();

    llm.push_tool_call(
        "calendar_create",
        serde_json::json!({"title": "Contract signing", "date": "2030-03-01T10:00:00Z"}),
    );
    llm.push_text("Booked for 1 March.");
    let outcome = engine
        .chat
        .post_message(&chat.id, &ann.id, "@@diary remind me to sign on 1 March 2030")
        .await
        .unwrap();
    assert_eq!(outcome.replies[0].content, "Booked for 1 March.");
    assert!(llm.last_message_of(1).starts_with("TOOL RESULT [calendar_create]:\nScheduled 'Contract signing'"));

    let events = engine.calendar.list_by_role(&assistant.id, true).await.unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.created_by_user_id.as_deref(), Some(ann.id.as_str()));
    assert_eq!(event.source_chat_id.as_deref(), Some(chat.id.as_str()));
    assert_eq!(event.metadata["detected_by_ai"], true);

    llm.push_text("Today: sign the contract.");
    let after = Utc.with_ymd_and_hms(2030, 3, 1, 10, 0, 30).unwrap();
    let fired = engine.scheduler.lock().await.run_once(after).await;
    assert_eq!(fired, 1);
    assert_eq!(
        *journal.lock().unwrap(),
        vec!["email:Today: sign the contract.".to_string()]
    );

    let log = engine.notifier.delivery_log(&ann.id, 5).await.unwrap();
    assert_eq!(log[0].status, DeliveryStatus::Sent);
    assert_eq!(log[0].event_id.as_deref(), Some(event.id.as_str()));

    assert_eq!(engine.scheduler.lock().await.run_once(after).await, 0);
}

#[tokio::test]
async fn lifecycle_starts_and_stops_the_scheduler() {
    let store = Store::open_in_memory().unwrap();
    let notifier = NotificationOrchestrator::new(store.clone());
    let engine = Engine::assemble(
        AppConfig::default(),
        store,
        Arc::new(ScriptedProvider::new()),
        notifier,
    );

    let mut lifecycle = engine.lifecycle();
    lifecycle.start().await.unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Ready);
    assert!(engine.scheduler.lock().await.is_running());

    lifecycle.shutdown().await.unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Shutdown);
    assert!(!engine.scheduler.lock().await.is_running());
}
