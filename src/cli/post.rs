use anyhow::Result;

use super::PostArgs;
use crate::core::config::AppConfig;
use crate::core::engine::Engine;
use crate::core::terminal;

pub async fn run_post(config: AppConfig, args: PostArgs) -> Result<()> {
    let engine = Engine::build(config).await?;
    let outcome = engine
        .chat
        .post_message(&args.chat, &args.sender, &args.content)
        .await?;

    let sender = author_name(&engine, &outcome.message.sender_id).await;
    terminal::print_chat_line(&sender, &outcome.message.content, false);
    if outcome.replies.is_empty() {
        terminal::print_info("No AI reply.");
    }
    for reply in &outcome.replies {
        let author = author_name(&engine, &reply.sender_id).await;
        terminal::print_chat_line(&author, &reply.content, true);
    }
    engine.notifier.close().await;
    Ok(())
}

async fn author_name(engine: &Engine, user_id: &str) -> String {
    match engine.store.get_user(user_id).await {
        Ok(Some(user)) => user.display_name.unwrap_or(user.username),
        _ => user_id.to_string(),
    }
}
