use anyhow::{Result, anyhow};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

use super::{RunContext, ToolCallRecord};
use crate::core::llm::{ChatMessage, Completion, ToolCallRequest};

static INVOKE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<invoke\s+name\s*=\s*["']([^"']+)["']\s*>([\s\S]*?)</invoke>"#)
        .expect("invoke pattern is valid")
});

/// Strip `<invoke>` tags from tool output so it cannot smuggle further calls
/// back into the loop.
pub fn sanitize_invoke_tags(text: &str) -> String {
    INVOKE_PATTERN
        .replace_all(text, "[invoke tag removed]")
        .to_string()
}

/// Tool calls written inline as `<invoke name="tool">{json}</invoke>`, for
/// models without native function calling.
fn parse_invoke_tags(text: &str) -> Vec<ToolCallRequest> {
    INVOKE_PATTERN
        .captures_iter(text)
        .map(|caps| {
            let raw = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            let arguments = if raw.is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
            };
            ToolCallRequest {
                id: None,
                name: caps[1].to_string(),
                arguments,
            }
        })
        .collect()
}

fn render_calls(calls: &[ToolCallRequest]) -> String {
    calls
        .iter()
        .map(|c| format!("<invoke name=\"{}\">{}</invoke>", c.name, c.arguments))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(super) async fn run(
    run: &RunContext<'_>,
    messages: Vec<ChatMessage>,
    records: &mut Vec<ToolCallRecord>,
) -> Result<String> {
    if run.tools.is_empty() {
        return run.complete_text(messages).await;
    }
    tokio::time::timeout(run.limits.tool_budget, tool_loop(run, messages, records)).await?
}

async fn tool_loop(
    run: &RunContext<'_>,
    messages: Vec<ChatMessage>,
    records: &mut Vec<ToolCallRecord>,
) -> Result<String> {
    let specs: Vec<_> = run.tools.iter().map(|t| t.spec()).collect();
    let mut context = messages;

    for iteration in 1..=run.limits.max_tool_iterations {
        let request = run.request(context.clone(), specs.clone());
        let calls = match run.llm.complete(&request).await? {
            Completion::Text(text) => {
                let calls = parse_invoke_tags(&text);
                if calls.is_empty() {
                    return Ok(text);
                }
                context.push(ChatMessage::assistant(text));
                calls
            }
            Completion::ToolCalls(calls) => {
                context.push(ChatMessage::assistant(render_calls(&calls)));
                calls
            }
        };

        for call in calls {
            info!("Tool call {} (iteration {})", call.name, iteration);
            let output = match run.tools.iter().find(|t| t.name() == call.name) {
                Some(tool) => match tool.call(call.arguments.clone(), run.tool_ctx).await {
                    Ok(out) => out,
                    Err(e) => {
                        warn!("Tool {} failed: {}", call.name, e);
                        format!("error: {}", e)
                    }
                },
                None => {
                    warn!("Model requested unknown tool {}", call.name);
                    format!("error: unknown tool '{}'", call.name)
                }
            };
            let safe = sanitize_invoke_tags(&output);
            context.push(ChatMessage::user(format!(
                "TOOL RESULT [{}]:\n{}",
                call.name, safe
            )));
            records.push(ToolCallRecord {
                tool_name: call.name,
                arguments: call.arguments,
                output: safe,
            });
        }
    }

    Err(anyhow!(
        "tool loop reached {} iterations without a final answer",
        run.limits.max_tool_iterations
    ))
}
