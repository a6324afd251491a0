use anyhow::{Context, Result};
use tracing::debug;

use super::plan::GraphPlan;
use super::{RunContext, last_user_message};
use crate::core::llm::ChatMessage;

fn node_prompt(current: &str, instruction: &str) -> String {
    format!(
        "{}\n\n--- Instruction: {} ---\nRespond based on the context and instruction above.",
        current, instruction
    )
}

/// Walks the graph from its entry. Each node sees the prior conversation and
/// the previous node's output, and its reply becomes the new current output.
pub(super) async fn run(
    run: &RunContext<'_>,
    graph: &GraphPlan,
    messages: &[ChatMessage],
) -> Result<String> {
    let history: Vec<ChatMessage> = match messages.iter().rposition(|m| m.role == "user") {
        Some(last) => messages[..last].to_vec(),
        None => messages.to_vec(),
    };
    let mut current = last_user_message(messages).to_string();

    for node in graph.path() {
        let mut turn = history.clone();
        turn.push(ChatMessage::user(node_prompt(&current, &node.instruction)));
        current = run
            .complete_text(turn)
            .await
            .with_context(|| format!("graph node '{}' failed", node.id))?;
        debug!("Graph node {} produced {} chars", node.id, current.len());
    }

    Ok(current)
}
