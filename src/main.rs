mod cli;
mod commands;
mod config;
mod datasource;
mod provider;
mod resource;
mod state;
mod ui;

#[cfg(test)]
mod scenarios;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config_path: Option<PathBuf>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config_path: cli.config,
    };

    match cli.command {
        Command::Schema => commands::schema::run(),
        Command::Validate(args) => commands::resource::validate(&ctx, &args),
        Command::Plan(args) => commands::resource::plan(&ctx, &args),
        Command::Apply(args) => commands::resource::apply(&ctx, &args),
        Command::Import(args) => commands::resource::import(&ctx, &args),
        Command::Read(args) => commands::resource::read(&ctx, &args),
        Command::Query(args) => commands::query::run(&ctx, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "linode-provider", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}
