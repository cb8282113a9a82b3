//! CLI command definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use relayr::config::RunOverrides;

/// Relayr - keeps a token-budgeted coding agent working across context rotations
#[derive(Parser, Debug)]
#[command(name = "relayr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace containing the task document
    #[arg(short, long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Subcommand to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// The subcommand, with a bare invocation meaning `run`.
    pub fn subcommand(&self) -> Commands {
        self.command.clone().unwrap_or_default()
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Supervise the agent until the task completes or the run stops
    Run {
        /// Maximum iterations for this invocation
        #[arg(short = 'n', long)]
        max_iterations: Option<u32>,

        /// Agent model
        #[arg(short = 'm', long)]
        model: Option<String>,

        /// Resume a prior agent session on the first iteration
        #[arg(short, long)]
        resume: Option<String>,

        /// Skip the git work tree check
        #[arg(long)]
        no_git_check: bool,
    },

    /// Show task progress and recent session history
    Status {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run {
            max_iterations: None,
            model: None,
            resume: None,
            no_git_check: false,
        }
    }
}

impl Commands {
    /// Config overrides carried by `run`; empty for other commands.
    pub fn overrides(&self) -> RunOverrides {
        match self {
            Commands::Run {
                max_iterations,
                model,
                no_git_check,
                ..
            } => RunOverrides {
                model: model.clone(),
                max_iterations: *max_iterations,
                skip_git_check: *no_git_check,
            },
            Commands::Status { .. } => RunOverrides::default(),
        }
    }
}
