use anyhow::{Context, Result};
use tracing::debug;

use super::plan::ChainStep;
use super::{RunContext, last_user_message};
use crate::core::llm::ChatMessage;

fn step_prompt(context: &str, index: usize, total: usize, instruction: &str) -> String {
    format!(
        "{}\n--- Step {}/{}: {} ---\nRespond to the instruction above based on the context.",
        context, index, total, instruction
    )
}

/// Runs the steps in order, feeding each one the accumulated context. The
/// result is the last step's raw output; any failure discards earlier steps.
pub(super) async fn run(
    run: &RunContext<'_>,
    steps: &[ChainStep],
    messages: &[ChatMessage],
) -> Result<String> {
    let total = steps.len();
    let mut context = format!("User question: {}\n", last_user_message(messages));
    let mut output = String::new();

    for (i, step) in steps.iter().enumerate() {
        let index = i + 1;
        let prompt = step_prompt(&context, index, total, &step.instruction);
        output = run
            .complete_text(vec![ChatMessage::user(prompt)])
            .await
            .with_context(|| format!("chain step {}/{} failed", index, total))?;

        let key = step
            .output_key
            .clone()
            .unwrap_or_else(|| format!("step_{}", index));
        debug!("Chain step {} produced {} chars", key, output.len());
        context.push_str(&format!("\n[{}]: {}\n", key, output));
    }

    Ok(output)
}
