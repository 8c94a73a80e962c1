use colored::*;
use terminal_size::{Width, Height, terminal_size};

use crate::agent::Termination;

fn rule() -> String {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    "─".repeat(width.0 as usize)
}

pub fn print_header(model: &str, tool_provider: &str) {
    let line = rule();
    println!("{}", line.black().bold());

    let name = "adverify".yellow().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  🔎 {} {}", name, version);

    // Model + tool provider
    let info = format!("  {}  •  {}", model, tool_provider).cyan();
    println!("{}", info);

    println!("{}", line.black().bold());
}

/// Print the final answer between rules
pub fn print_answer(answer: &str) {
    let line = rule();
    println!("\n{}", line.black().bold());
    println!("{}", answer);
    println!("{}", line.black().bold());
}

pub fn print_termination(termination: Termination) {
    match termination {
        Termination::Completed => {}
        Termination::BuiltinOnly => print_warning("Model only requested built-in tools; answer may be partial"),
        Termination::BudgetExhausted => print_warning("Tool-cycle budget exhausted; answer may be partial"),
    }
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

pub fn print_thinking(msg: &str) {
    println!("  {} {}...", "∴".magenta(), msg);
}
