//! Terminal output. Documents go to stdout; everything meant for a human
//! goes to stderr so the JSON stays pipeable.

use colored::Colorize;
use reconcile::{Action, Diagnostic, Severity};

/// Print an info message
pub fn info(msg: &str) {
    eprintln!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// One diagnostic, with its attribute path and detail.
pub fn diagnostic(diag: &Diagnostic) {
    let summary = match &diag.attribute {
        Some(attr) => format!("{}: {}", attr.bold(), diag.summary),
        None => diag.summary.clone(),
    };
    match diag.severity {
        Severity::Error => error(&summary),
        Severity::Warning => warn(&summary),
    }
    if let Some(detail) = &diag.detail {
        for line in detail.lines() {
            eprintln!("  {}", line.dimmed());
        }
    }
}

/// A one-line plan summary.
pub fn plan_summary(type_name: &str, action: Action, changed: &[&str]) {
    let label = match action {
        Action::Create => "create".green(),
        Action::Update => "update in place".yellow(),
        Action::Replace => "replace".red(),
        Action::Delete => "destroy".red(),
        Action::NoOp => "no changes".dimmed(),
    };
    if changed.is_empty() {
        eprintln!("{} {type_name}: {label}", "●".blue());
    } else {
        eprintln!(
            "{} {type_name}: {label} ({})",
            "●".blue(),
            changed.join(", ").dimmed()
        );
    }
}
