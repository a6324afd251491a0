mod event;
mod post;
mod serve;

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use crate::core::config::{AppConfig, DEFAULT_CONFIG_FILE};
use crate::core::terminal::{self, print_error};
use crate::logging;

fn print_help() {
    terminal::print_commands(
        "Commands",
        &[
            ("serve", "Run the scheduler until Ctrl+C"),
            ("post", "Post a message and print the AI replies"),
            ("event", "Create a calendar event for a role"),
            ("help", "Show this help"),
        ],
    );
    terminal::print_commands(
        "Options",
        &[
            ("--config <path>", "Config file (default rolechat.toml, or $ROLECHAT_CONFIG)"),
            ("post --chat <id> --sender <id> --content <text>", ""),
            ("event --role <id> --title <t> --at <date> | --cron <expr>", ""),
            ("      [--user <id>] [--description <d>]", ""),
        ],
    );
    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("rolechat").green()
    );
}

/// Value following `flag`, if the flag is present and has one.
fn flag_value(args: &[String], i: usize) -> Option<String> {
    args.get(i + 1).cloned()
}

pub(crate) fn parse_config_arg(args: &[String], start: usize) -> Option<PathBuf> {
    let mut i = start;
    while i < args.len() {
        if args[i] == "--config" || args[i] == "-c" {
            return flag_value(args, i).map(PathBuf::from);
        }
        i += 1;
    }
    None
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PostArgs {
    pub chat: String,
    pub sender: String,
    pub content: String,
}

pub(crate) fn parse_post_args(args: &[String], start: usize) -> PostArgs {
    let mut parsed = PostArgs::default();
    let mut i = start;
    while i < args.len() {
        let slot = match args[i].as_str() {
            "--chat" => &mut parsed.chat,
            "--sender" | "-s" => &mut parsed.sender,
            "--content" | "-m" => &mut parsed.content,
            _ => {
                i += 1;
                continue;
            }
        };
        match flag_value(args, i) {
            Some(value) => {
                *slot = value;
                i += 2;
            }
            None => i += 1,
        }
    }
    parsed
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct EventArgs {
    pub role: String,
    pub title: String,
    pub at: Option<String>,
    pub cron: Option<String>,
    pub user: Option<String>,
    pub description: Option<String>,
}

pub(crate) fn parse_event_args(args: &[String], start: usize) -> EventArgs {
    let mut parsed = EventArgs::default();
    let mut i = start;
    while i < args.len() {
        let Some(value) = flag_value(args, i) else {
            break;
        };
        let consumed = match args[i].as_str() {
            "--role" | "-r" => {
                parsed.role = value;
                true
            }
            "--title" | "-t" => {
                parsed.title = value;
                true
            }
            "--at" => {
                parsed.at = Some(value);
                true
            }
            "--cron" => {
                parsed.cron = Some(value);
                true
            }
            "--user" | "-u" => {
                parsed.user = Some(value);
                true
            }
            "--description" | "-d" => {
                parsed.description = Some(value);
                true
            }
            _ => false,
        };
        i += if consumed { 2 } else { 1 };
    }
    parsed
}

async fn load_config(args: &[String]) -> Result<AppConfig> {
    let path = parse_config_arg(args, 2)
        .or_else(|| std::env::var("ROLECHAT_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    AppConfig::load(path).await
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(cmd) = args.get(1).map(String::as_str) else {
        print_help();
        return Ok(());
    };

    match cmd {
        "help" | "--help" | "-h" => {
            print_help();
            return Ok(());
        }
        "serve" | "post" | "event" => {}
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            return Ok(());
        }
    }

    let config = load_config(&args).await?;
    logging::init(&config.logging.level, config.logging.file.as_deref())?;

    match cmd {
        "serve" => serve::run_serve(config).await,
        "post" => {
            let parsed = parse_post_args(&args, 2);
            if parsed.chat.is_empty() || parsed.sender.is_empty() || parsed.content.is_empty() {
                print_error("post requires --chat, --sender and --content.");
                print_help();
                return Ok(());
            }
            post::run_post(config, parsed).await
        }
        _ => {
            let parsed = parse_event_args(&args, 2);
            if parsed.role.is_empty() || parsed.title.is_empty() {
                print_error("event requires --role and --title.");
                print_help();
                return Ok(());
            }
            event::run_event(config, parsed).await
        }
    }
}
