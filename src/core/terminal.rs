use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");
pub static SPEECH: Emoji<'_, '_> = Emoji("💬 ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

/// One chat line, persona replies highlighted.
pub fn print_chat_line(author: &str, content: &str, from_ai: bool) {
    let name = if from_ai {
        style(author).bold().magenta()
    } else {
        style(author).bold().green()
    };
    println!("{} {}: {}", SPEECH, name, content);
}

/// Two-column command listing for `help`.
pub fn print_commands(title: &str, commands: &[(&str, &str)]) {
    println!("\n {}", style(title).bold().underlined());
    let width = commands.iter().map(|(c, _)| c.len()).max().unwrap_or(0);
    for (cmd, desc) in commands {
        let padded = format!("{:<width$}", cmd, width = width);
        println!("   {}  {}", style(padded).green(), style(desc).dim());
    }
}
