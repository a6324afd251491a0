use anyhow::Result;
use tracing::info;

use crate::core::config::AppConfig;
use crate::core::engine::Engine;
use crate::core::terminal;

/// Starts the scheduler and waits for Ctrl+C.
pub async fn run_serve(config: AppConfig) -> Result<()> {
    let engine = Engine::build(config).await?;

    terminal::print_step("Starting rolechat");
    terminal::print_status("Database", &engine.config.database.path.display().to_string());
    terminal::print_status("LLM", &format!(
        "{} ({})",
        engine.config.llm.base_url, engine.config.llm.default_model
    ));
    let senders = engine.notifier.sender_kinds();
    if senders.is_empty() {
        terminal::print_warn("No notification senders configured; reminders will only be logged.");
    } else {
        terminal::print_status("Senders", &senders.join(", "));
    }

    let mut lifecycle = engine.lifecycle();
    lifecycle.start().await?;
    terminal::print_success("Running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    lifecycle.shutdown().await?;
    terminal::print_info("Stopped.");
    Ok(())
}
