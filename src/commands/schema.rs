use super::print_json;
use crate::provider::Provider;
use anyhow::Result;
use std::process::ExitCode;

/// Print every model the provider serves.
pub fn run() -> Result<ExitCode> {
    let adapter = Provider::offline()?.adapter();
    print_json(&adapter.schema())?;
    Ok(ExitCode::SUCCESS)
}
