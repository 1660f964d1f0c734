use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "linode-provider")]
#[command(version)]
#[command(about = "Reconcile Linode DNS, firewall and IP resources", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Provider config file (defaults to ~/.config/linode-provider/config.toml)
    #[arg(long, global = true, env = "LINODE_PROVIDER_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the schema of every resource and data source
    Schema,

    /// Check a resource configuration without contacting the API
    Validate(ValidateArgs),

    /// Show what apply would change
    Plan(PlanArgs),

    /// Create, update, replace or delete a resource
    Apply(PlanArgs),

    /// Adopt an existing resource into a state file
    Import(ImportArgs),

    /// Refresh a state file from the API
    Read(StateArgs),

    /// Run a data source query
    Query(QueryArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Resource type, e.g. linode_domain
    pub resource_type: String,

    /// Desired configuration (JSON, `-` for stdin)
    pub desired: PathBuf,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Resource type, e.g. linode_domain
    pub resource_type: String,

    /// State file of the resource
    #[arg(short, long, value_name = "FILE")]
    pub state: PathBuf,

    /// Desired configuration (JSON, `-` for stdin); omit to destroy
    #[arg(short, long, value_name = "FILE")]
    pub desired: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Resource type, e.g. linode_domain_record
    pub resource_type: String,

    /// Import ID, e.g. `12,34` for a record in zone 12
    pub id: String,

    /// State file to create
    #[arg(short, long, value_name = "FILE")]
    pub state: PathBuf,
}

#[derive(Debug, Args)]
pub struct StateArgs {
    /// Resource type, e.g. linode_firewall
    pub resource_type: String,

    /// State file of the resource
    #[arg(short, long, value_name = "FILE")]
    pub state: PathBuf,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Data source, e.g. linode_domains
    pub data_source: String,

    /// Query arguments (JSON, `-` for stdin); omit to match everything
    pub args: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "linode-provider",
            "-vv",
            "apply",
            "linode_domain",
            "--state",
            "zone.json",
            "--desired",
            "-",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.resource_type, "linode_domain");
        assert_eq!(args.desired, Some(PathBuf::from("-")));
    }

    #[test]
    fn test_state_is_required_for_read() {
        assert!(Cli::try_parse_from(["linode-provider", "read", "linode_domain"]).is_err());
    }
}
