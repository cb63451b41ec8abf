use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "modelsort")]
#[command(about = "Organize a 3D model library into one folder per model", long_about = None)]
pub struct Cli {
    /// Directory to organize (defaults to the current directory)
    #[arg(long, global = true)]
    pub directory: Option<PathBuf>,

    /// Skip confirmation prompts
    #[arg(long, global = true)]
    pub trust: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan the library and write an organization plan (no changes made)
    Plan,
    /// Execute a previously written organization plan
    Commit {
        /// Validate the plan against the filesystem without applying it
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the resolved configuration
    PrintConfig,
}
