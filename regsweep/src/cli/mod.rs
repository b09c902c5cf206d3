// CLI argument parsing and definitions

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "regsweep")]
#[command(about = "Retention and garbage collection for Docker/OCI registries")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a configuration file (default: ~/.config/regsweep/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
}

/// Where the deployed image references come from.
#[derive(Debug, Clone, Default, ClapArgs)]
pub struct DeployedArgs {
    /// File with one deployed image reference per line
    #[arg(long = "deployed", value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// A deployed image reference (repeatable)
    #[arg(long = "image", value_name = "REF")]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Show what a sweep would delete without deleting anything
    Plan {
        #[command(flatten)]
        deployed: DeployedArgs,

        /// Write the plan as JSON to this path
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Delete images recommended by the retention and orphan policies
    Sweep {
        #[command(flatten)]
        deployed: DeployedArgs,

        /// Delete even when cleanup_enabled is false, without prompting
        #[arg(long)]
        force: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Write the sweep report as JSON to this path
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Report newer versions of deployed images
    Updates {
        #[command(flatten)]
        deployed: DeployedArgs,
    },

    /// Print the effective configuration
    Config,
}
