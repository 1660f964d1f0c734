//! Resource lifecycle commands: validate, plan, apply, import and read.
//!
//! The state file is the only memory between runs. Apply writes it as soon
//! as a new resource has an ID, so a failure in a later step still leaves
//! the resource tracked.

use super::{print_json, read_document, report};
use crate::Context;
use crate::cli::{ImportArgs, PlanArgs, StateArgs, ValidateArgs};
use crate::provider::Provider;
use crate::state::ResourceState;
use crate::ui;
use anyhow::{Result, bail};
use linode_api::CancelToken;
use reconcile::{Action, Change, Diagnostics, HostAdapter, Response};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::process::ExitCode;

/// Check a configuration without contacting the API.
pub fn validate(ctx: &Context, args: &ValidateArgs) -> Result<ExitCode> {
    let config = read_document(&args.desired)?;
    let adapter = Provider::offline()?.adapter();
    let response = adapter.validate(&args.resource_type, &config);
    if !response.has_errors() && !ctx.quiet {
        ui::success(&format!("{} configuration is valid", args.resource_type));
    }
    Ok(report(ctx, &response))
}

struct Inputs {
    prior: Option<JsonValue>,
    desired: Option<JsonValue>,
}

fn inputs(args: &PlanArgs) -> Result<Inputs> {
    let prior = ResourceState::load_for(&args.state, &args.resource_type)?.map(|s| s.attributes);
    let desired = args.desired.as_deref().map(read_document).transpose()?;
    Ok(Inputs { prior, desired })
}

fn run_plan(
    ctx: &Context,
    adapter: &HostAdapter,
    cancel: &CancelToken,
    args: &PlanArgs,
    inputs: &Inputs,
) -> Response {
    let response = adapter.plan(
        cancel,
        &args.resource_type,
        inputs.prior.as_ref(),
        inputs.desired.as_ref(),
    );
    if let Some(changes) = &response.changes {
        let changed: Vec<&str> = changes
            .attributes
            .iter()
            .filter(|(_, c)| **c != Change::Unchanged)
            .map(|(name, _)| name.as_str())
            .collect();
        ui::plan_summary(&args.resource_type, changes.action, &changed);
        if ctx.verbose > 0 {
            let changed_attrs = changes
                .attributes
                .iter()
                .filter(|(_, c)| **c != Change::Unchanged);
            for (name, change) in changed_attrs {
                let kind = match change {
                    Change::Replace => "forces replacement",
                    Change::Compute => "known after apply",
                    _ => "updated in place",
                };
                ui::info(&format!("{name}: {kind}"));
            }
        }
    }
    response
}

/// Show what apply would change.
pub fn plan(ctx: &Context, args: &PlanArgs) -> Result<ExitCode> {
    let inputs = inputs(args)?;
    let adapter = ctx.provider()?.adapter();
    let response = run_plan(ctx, &adapter, &CancelToken::new(), args, &inputs);
    print_json(&response)?;
    Ok(report(ctx, &response))
}

/// Plan and apply, keeping the state file current.
pub fn apply(ctx: &Context, args: &PlanArgs) -> Result<ExitCode> {
    let inputs = inputs(args)?;
    let adapter = ctx.provider()?.adapter();
    let cancel = CancelToken::new();

    let planned = run_plan(ctx, &adapter, &cancel, args, &inputs);
    if planned.has_errors() {
        return Ok(report(ctx, &planned));
    }
    if planned.changes.as_ref().is_some_and(|c| c.action == Action::NoOp) {
        if let Some(state) = &inputs.prior {
            print_json(state)?;
        }
        return Ok(report(ctx, &planned));
    }

    let mut save_error: Option<anyhow::Error> = None;
    let mut checkpoint = |partial: &JsonValue| {
        log::debug!("Checkpointing {} to {}", args.resource_type, args.state.display());
        if let Err(e) = ResourceState::new(&args.resource_type, partial.clone()).save(&args.state) {
            if save_error.is_none() {
                save_error = Some(e);
            }
        }
    };
    let mut response = adapter.apply(
        &cancel,
        &args.resource_type,
        inputs.prior.as_ref(),
        planned.state.as_ref(),
        &mut checkpoint,
    );
    if let Some(e) = save_error {
        ui::error(&format!("Could not checkpoint state: {e:#}"));
    }

    // Plan warnings (rounded TTLs and the like) belong with the result.
    let mut diagnostics = planned.diagnostics;
    diagnostics.append(&mut response.diagnostics);
    response.diagnostics = diagnostics;

    if !response.has_errors() {
        persist(&args.resource_type, &args.state, response.state.as_ref())?;
        if !ctx.quiet {
            ui::success(&format!("Applied {}", args.resource_type));
        }
    }
    if let Some(state) = &response.state {
        print_json(state)?;
    }
    Ok(report(ctx, &response))
}

fn persist(resource_type: &str, path: &Path, state: Option<&JsonValue>) -> Result<()> {
    match state {
        Some(state) => ResourceState::new(resource_type, state.clone()).save(path),
        None => ResourceState::remove(path),
    }
}

/// Adopt an existing resource into a new state file.
pub fn import(ctx: &Context, args: &ImportArgs) -> Result<ExitCode> {
    if args.state.exists() {
        bail!(
            "{} already exists; refusing to overwrite tracked state",
            args.state.display()
        );
    }
    let adapter = ctx.provider()?.adapter();
    let mut response = adapter.import(&CancelToken::new(), &args.resource_type, &args.id);
    if response.gone {
        let mut diags = Diagnostics::new();
        diags.error(format!(
            "cannot import non-existent {} {:?}",
            args.resource_type, args.id
        ));
        response = Response {
            diagnostics: diags.into_vec(),
            ..Default::default()
        };
    }
    if let Some(state) = &response.state {
        persist(&args.resource_type, &args.state, Some(state))?;
        print_json(state)?;
    }
    Ok(report(ctx, &response))
}

/// Refresh a state file from the API, dropping it if the resource is gone.
pub fn read(ctx: &Context, args: &StateArgs) -> Result<ExitCode> {
    let Some(mut state) = ResourceState::load_for(&args.state, &args.resource_type)? else {
        bail!("no state at {}", args.state.display());
    };
    let adapter = ctx.provider()?.adapter();
    let response = adapter.read(&CancelToken::new(), &args.resource_type, &state.attributes);
    if response.gone {
        ResourceState::remove(&args.state)?;
    } else if let Some(refreshed) = &response.state {
        state.update(refreshed.clone(), &args.state)?;
        print_json(refreshed)?;
    }
    Ok(report(ctx, &response))
}
