//! Output functions for consistent CLI formatting

use super::context::UiContext;
use console::{style, StyledObject};

/// Status mark in front of a step line
#[derive(Debug, Clone, Copy)]
enum Mark {
    Ok,
    Warn,
    Fail,
    Info,
}

impl Mark {
    /// Symbol on a terminal, bracketed tag in logs
    fn render(self, ctx: &UiContext) -> StyledObject<&'static str> {
        let fancy = ctx.use_fancy_output();
        match self {
            Self::Ok => style(if fancy { "✓" } else { "[OK]" }).green(),
            Self::Warn => style(if fancy { "!" } else { "[WARN]" }).yellow(),
            Self::Fail => style(if fancy { "✗" } else { "[FAIL]" }).red(),
            Self::Info => style(if fancy { "•" } else { "[INFO]" }).cyan(),
        }
    }
}

fn step(ctx: &UiContext, mark: Mark, message: &str) {
    println!("  {} {}", mark.render(ctx), message);
}

/// Dim detail on a terminal, plain text otherwise
fn detail(ctx: &UiContext, text: &str) -> String {
    if ctx.use_fancy_output() {
        style(text).dim().to_string()
    } else {
        text.to_string()
    }
}

/// Final summary line
pub fn outro_success(ctx: &UiContext, message: &str) {
    let message = if ctx.use_fancy_output() {
        style(message).green().bold().to_string()
    } else {
        message.to_string()
    };
    println!("{} {}", Mark::Ok.render(ctx).bold(), message);
}

/// Section header
pub fn section(ctx: &UiContext, title: &str) {
    let title = style(title).bold();
    if ctx.use_fancy_output() {
        println!("{}", title.cyan());
    } else {
        println!("{}", title);
    }
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    step(ctx, Mark::Ok, message);
}

pub fn step_ok_detail(ctx: &UiContext, message: &str, info: &str) {
    step(ctx, Mark::Ok, &format!("{} ({})", message, detail(ctx, info)));
}

pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    step(ctx, Mark::Warn, &format!("{} - {}", message, detail(ctx, hint)));
}

/// Failed step; the cause is shown in red on a terminal
pub fn step_error_detail(ctx: &UiContext, message: &str, cause: &str) {
    let cause = if ctx.use_fancy_output() {
        style(cause).red().to_string()
    } else {
        cause.to_string()
    };
    step(ctx, Mark::Fail, &format!("{}: {}", message, cause));
}

pub fn step_info(ctx: &UiContext, message: &str) {
    step(ctx, Mark::Info, message);
}

/// Indented `key: value` line
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    println!("    {}: {}", detail(ctx, key), value);
}
