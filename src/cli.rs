use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "steward")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge packages and users to a declared state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Bring the host to the state declared in a catalog
    Apply(ApplyArgs),

    /// List the providers of a resource type and their suitability here
    Providers {
        /// Resource type (package, user)
        resource_type: String,
    },

    /// Show the current state of resources, as the default provider sees it
    Resource {
        /// Resource type (package, user)
        resource_type: String,

        /// Only this resource
        name: Option<String>,

        /// Use this provider instead of the default
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Show the host facts used for provider selection
    Facts,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Catalog file (defaults to catalog.toml in the config directory)
    pub catalog: Option<PathBuf>,

    /// Report what would change without changing anything
    #[arg(short = 'n', long, env = "STEWARD_NOOP")]
    pub noop: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}
