use super::{print_json, read_document, report};
use crate::Context;
use crate::cli::QueryArgs;
use anyhow::Result;
use linode_api::CancelToken;
use serde_json::Value as JsonValue;
use std::process::ExitCode;

/// Run a data source and print its result document.
pub fn run(ctx: &Context, args: &QueryArgs) -> Result<ExitCode> {
    let query = match &args.args {
        Some(path) => read_document(path)?,
        None => JsonValue::Null,
    };
    let adapter = ctx.provider()?.adapter();
    let response = adapter.query(&CancelToken::new(), &args.data_source, &query);
    if let Some(doc) = &response.state {
        print_json(doc)?;
    }
    Ok(report(ctx, &response))
}
