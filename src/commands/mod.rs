//! Subcommand implementations.
//!
//! Every command prints its result document as JSON on stdout and its
//! diagnostics on stderr, and fails when any diagnostic is an error.

pub mod query;
pub mod resource;
pub mod schema;

use crate::Context;
use crate::config::ProviderConfig;
use crate::provider::Provider;
use crate::ui;
use anyhow::{Context as _, Result};
use reconcile::{Response, Severity};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process::ExitCode;

impl Context {
    /// Load the provider config and connect.
    pub fn provider(&self) -> Result<Provider> {
        let config = ProviderConfig::load(self.config_path.as_deref())?;
        Provider::connect(&config)
    }
}

/// Read a JSON document from a file, or stdin for `-`.
pub fn read_document(path: &Path) -> Result<JsonValue> {
    let content = if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?
    };
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Print a document to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{out}");
    Ok(())
}

/// Print diagnostics; warnings are hidden under `--quiet`.
pub fn report(ctx: &Context, response: &Response) -> ExitCode {
    for diag in &response.diagnostics {
        if ctx.quiet && diag.severity == Severity::Warning {
            continue;
        }
        ui::diagnostic(diag);
    }
    if response.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
