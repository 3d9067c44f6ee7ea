//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - schedule: preview the next trigger times
//! - state: show or clear the persisted schedule state

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Graphbot - scheduled statistics-graph updates for a chat channel
#[derive(Parser, Debug)]
#[command(name = "graphbot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Preview upcoming trigger times from config and persisted state
    Schedule {
        /// How many upcoming triggers to show
        #[arg(short = 'n', long, default_value_t = 3)]
        count: u32,
    },

    /// Inspect or reset the persisted schedule state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State file subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum StateCommands {
    /// Show the persisted schedule state
    Show,

    /// Delete the state file so the schedule recalculates from scratch
    Clear,
}
