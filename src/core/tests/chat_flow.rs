//! End-to-end message handling: mention routing, mirror auto-respond,
//! silent failures, context assembly and the validation workflow.

use std::sync::{Arc, Mutex};

use crate::core::agent::ToolRegistry;
use crate::core::chat::ChatService;
use crate::core::models::{ChatKind, MentionKind, Role, SenderKind, User};
use crate::core::notify::NotificationOrchestrator;
use crate::core::pipeline::{ReplySettings, ResponsePipeline};
use crate::core::testing::{RecordingSender, ScriptedProvider, Seeded, dispatcher_with};

struct Fixture {
    seeded: Seeded,
    llm: Arc<ScriptedProvider>,
    chat: ChatService,
    lawyer: Role,
    ann: User,
    legal: User,
}

impl Fixture {
    async fn new() -> Self {
        let seeded = Seeded::new().await;
        let lawyer = seeded.role("lawyer", "You are a careful lawyer.").await;
        let ann = seeded.user("ann").await;
        let legal = seeded
            .add(User::new(&seeded.org.id, "legal").with_role(&lawyer.id))
            .await;

        let llm = Arc::new(ScriptedProvider::new());
        let dispatcher = dispatcher_with(llm.clone(), ToolRegistry::new());
        let pipeline = Arc::new(ResponsePipeline::new(
            seeded.store.clone(),
            dispatcher,
            ReplySettings::default(),
        ));
        let chat = ChatService::new(seeded.store.clone(), pipeline);
        Self {
            seeded,
            llm,
            chat,
            lawyer,
            ann,
            legal,
        }
    }

    async fn group(&self, members: &[&User]) -> String {
        let participants = members.iter().map(|u| u.id.clone()).collect();
        self.chat
            .create_chat(&self.seeded.org.id, ChatKind::Group, Some("team"), participants, None)
            .await
            .unwrap()
            .id
    }
}

#[tokio::test]
async fn ai_mention_gets_a_pending_reply_from_the_role() {
    let fx = Fixture::new().await;
    let chat_id = fx.group(&[&fx.ann]).await;
    fx.llm.push_text("Clause 4 is unenforceable.");

    let outcome = fx
        .chat
        .post_message(&chat_id, &fx.ann.id, "@@legal please review")
        .await
        .unwrap();

    assert_eq!(outcome.message.mentions.len(), 1);
    assert_eq!(outcome.message.mentions[0].kind, MentionKind::AiRole);
    assert_eq!(outcome.message.mentions[0].user_id, fx.legal.id);
    assert_eq!(outcome.message.mentions[0].position, 0);
    assert!(outcome.message.ai_validated);

    assert_eq!(outcome.replies.len(), 1);
    let reply = &outcome.replies[0];
    assert_eq!(reply.sender_kind, SenderKind::AiPersona);
    assert_eq!(reply.sender_id, fx.legal.id);
    assert_eq!(reply.content, "Clause 4 is unenforceable.");
    assert_eq!(reply.reply_to_id.as_deref(), Some(outcome.message.id.as_str()));
    assert!(!reply.ai_validated);

    let request = &fx.llm.requests()[0];
    assert_eq!(request.system_prompt, "You are a careful lawyer.");
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].content, "please review");
    assert_eq!(request.max_tokens, 256);

    let stored = fx.chat.list_messages(&chat_id, 50).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].id, reply.id);
}

#[tokio::test]
async fn each_ai_mention_replies_in_order() {
    let fx = Fixture::new().await;
    let finance_role = fx.seeded.role("finance", "You count money.").await;
    let finance = fx
        .seeded
        .add(User::new(&fx.seeded.org.id, "finance").with_role(&finance_role.id))
        .await;
    let chat_id = fx.group(&[&fx.ann]).await;
    fx.llm.push_text("legal view");
    fx.llm.push_text("finance view");

    let outcome = fx
        .chat
        .post_message(&chat_id, &fx.ann.id, "@@legal and @@finance thoughts?")
        .await
        .unwrap();

    let senders: Vec<&str> = outcome.replies.iter().map(|r| r.sender_id.as_str()).collect();
    assert_eq!(senders, vec![fx.legal.id.as_str(), finance.id.as_str()]);
    assert_eq!(fx.llm.requests()[1].system_prompt, "You count money.");
    assert_eq!(fx.llm.last_message_of(1), "@@legal and thoughts?");
}

#[tokio::test]
async fn unknown_mentions_are_dropped() {
    let fx = Fixture::new().await;
    let chat_id = fx.group(&[&fx.ann]).await;

    let outcome = fx
        .chat
        .post_message(&chat_id, &fx.ann.id, "@ghost and @@nobody hello")
        .await
        .unwrap();

    assert!(outcome.message.mentions.is_empty());
    assert!(outcome.replies.is_empty());
    assert!(fx.llm.requests().is_empty());
}

#[tokio::test]
async fn mirror_answers_with_the_senders_role() {
    let fx = Fixture::new().await;
    fx.seeded
        .store
        .set_user_role(&fx.ann.id, Some(&fx.lawyer.id))
        .await
        .unwrap();
    let mirror = fx
        .seeded
        .add(User::new(&fx.seeded.org.id, "mirror").mirror())
        .await;
    let chat_id = fx
        .chat
        .get_or_create_direct_chat(&fx.seeded.org.id, &fx.ann.id, &mirror.id)
        .await
        .unwrap()
        .id;
    fx.llm.push_text("As your counsel, yes.");

    let outcome = fx.chat.post_message(&chat_id, &fx.ann.id, "Can I sign this?").await.unwrap();

    assert_eq!(outcome.replies.len(), 1);
    assert_eq!(outcome.replies[0].sender_id, mirror.id);
    let request = &fx.llm.requests()[0];
    assert_eq!(request.system_prompt, "You are a careful lawyer.");
    assert_eq!(request.messages[0].content, "Can I sign this?");
}

#[tokio::test]
async fn mirror_is_silent_for_senders_without_a_role() {
    let fx = Fixture::new().await;
    let mirror = fx
        .seeded
        .add(User::new(&fx.seeded.org.id, "mirror").mirror())
        .await;
    let chat_id = fx.group(&[&fx.ann, &mirror]).await;

    let outcome = fx.chat.post_message(&chat_id, &fx.ann.id, "anyone?").await.unwrap();

    assert!(outcome.replies.is_empty());
    assert!(fx.llm.requests().is_empty());
}

#[tokio::test]
async fn llm_failure_stores_nothing() {
    let fx = Fixture::new().await;
    let chat_id = fx.group(&[&fx.ann]).await;
    fx.llm.push_error("model not loaded");

    let outcome = fx
        .chat
        .post_message(&chat_id, &fx.ann.id, "@@legal review")
        .await
        .unwrap();

    assert!(outcome.replies.is_empty());
    assert_eq!(fx.chat.list_messages(&chat_id, 50).await.unwrap().len(), 1);
}

#[tokio::test]
async fn inactive_role_stays_silent() {
    let fx = Fixture::new().await;
    fx.seeded.store.set_role_active(&fx.lawyer.id, false).await.unwrap();
    let chat_id = fx.group(&[&fx.ann]).await;

    let outcome = fx
        .chat
        .post_message(&chat_id, &fx.ann.id, "@@legal review")
        .await
        .unwrap();

    assert!(outcome.replies.is_empty());
    assert!(fx.llm.requests().is_empty());
}

#[tokio::test]
async fn context_maps_ai_turns_to_assistant() {
    let fx = Fixture::new().await;
    let chat_id = fx.group(&[&fx.ann]).await;
    fx.llm.push_text("hello human");
    fx.llm.push_text("still here");

    fx.chat.post_message(&chat_id, &fx.ann.id, "@@legal hi").await.unwrap();
    fx.chat.post_message(&chat_id, &fx.ann.id, "@@legal again").await.unwrap();

    let messages = &fx.llm.requests()[1].messages;
    let turns: Vec<(&str, &str)> = messages
        .iter()
        .map(|m| (m.role.as_str(), m.content.as_str()))
        .collect();
    assert_eq!(
        turns,
        vec![
            ("user", "@@legal hi"),
            ("assistant", "hello human"),
            ("user", "again"),
        ]
    );
}

#[tokio::test]
async fn context_keeps_only_the_latest_ten_messages() {
    let fx = Fixture::new().await;
    let chat_id = fx.group(&[&fx.ann]).await;
    for i in 0..12 {
        fx.chat
            .post_message(&chat_id, &fx.ann.id, &format!("note {}", i))
            .await
            .unwrap();
    }
    fx.llm.push_text("summary");

    fx.chat.post_message(&chat_id, &fx.ann.id, "@@legal summarise").await.unwrap();

    let messages = &fx.llm.requests()[0].messages;
    assert_eq!(messages.len(), 11);
    assert_eq!(messages[0].content, "note 2");
    assert_eq!(messages[9].content, "note 11");
    assert_eq!(messages[10].content, "summarise");
}

#[tokio::test]
async fn validation_edit_and_delete() {
    let fx = Fixture::new().await;
    let chat_id = fx.group(&[&fx.ann]).await;
    fx.llm.push_text("draft answer");

    let outcome = fx
        .chat
        .post_message(&chat_id, &fx.ann.id, "@@legal draft")
        .await
        .unwrap();
    let reply_id = outcome.replies[0].id.clone();

    let pending = fx.chat.list_unvalidated(&fx.ann.id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, reply_id);

    let validated = fx
        .chat
        .validate_ai_message(&reply_id, Some("final answer"))
        .await
        .unwrap();
    assert!(validated.ai_validated);
    assert!(validated.ai_edited);
    assert_eq!(validated.content, "final answer");
    assert!(fx.chat.list_unvalidated(&fx.ann.id).await.unwrap().is_empty());

    assert!(fx.chat.validate_ai_message(&outcome.message.id, None).await.is_err());

    assert!(fx.chat.delete_message(&reply_id).await.unwrap());
    assert!(!fx.chat.delete_message("missing").await.unwrap());
    let live = fx.chat.list_messages(&chat_id, 50).await.unwrap();
    assert_eq!(live.len(), 1);
}

#[tokio::test]
async fn posting_requires_membership() {
    let fx = Fixture::new().await;
    let bob = fx.seeded.user("bob").await;
    let chat_id = fx.group(&[&fx.ann]).await;

    assert!(fx.chat.post_message(&chat_id, &bob.id, "hi").await.is_err());
    assert!(fx.chat.post_message("no-such-chat", &fx.ann.id, "hi").await.is_err());
}

#[tokio::test]
async fn direct_chat_is_reused() {
    let fx = Fixture::new().await;
    let bob = fx.seeded.user("bob").await;

    let first = fx
        .chat
        .get_or_create_direct_chat(&fx.seeded.org.id, &fx.ann.id, &bob.id)
        .await
        .unwrap();
    let second = fx
        .chat
        .get_or_create_direct_chat(&fx.seeded.org.id, &bob.id, &fx.ann.id)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.kind, ChatKind::Direct);
}

#[tokio::test]
async fn replies_are_pushed_when_a_notifier_is_attached() {
    let seeded = Seeded::new().await;
    let lawyer = seeded.role("lawyer", "Law.").await;
    let ann = seeded.user("ann").await;
    seeded
        .add(User::new(&seeded.org.id, "legal").with_role(&lawyer.id))
        .await;

    let journal = Arc::new(Mutex::new(Vec::new()));
    let mut notifier = NotificationOrchestrator::new(seeded.store.clone());
    notifier.register_sender(Arc::new(RecordingSender::new("telegram", true, journal.clone())));
    notifier
        .register_channel(&ann.id, &seeded.org.id, "telegram", serde_json::json!({"chat_id": "7"}), 0)
        .await
        .unwrap();
    notifier.verify_channel(&ann.id, "telegram").await.unwrap();

    let llm = Arc::new(ScriptedProvider::replying(&["pushed reply"]));
    let pipeline = Arc::new(ResponsePipeline::new(
        seeded.store.clone(),
        dispatcher_with(llm, ToolRegistry::new()),
        ReplySettings::default(),
    ));
    let chat = ChatService::new(seeded.store.clone(), pipeline).with_notifier(Arc::new(notifier));
    let chat_id = chat
        .create_chat(&seeded.org.id, ChatKind::Main, None, Vec::new(), Some(&ann.id))
        .await
        .unwrap()
        .id;

    chat.post_message(&chat_id, &ann.id, "@@legal ping").await.unwrap();

    assert_eq!(*journal.lock().unwrap(), vec!["telegram:pushed reply".to_string()]);
}
