//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: drive the kernel from a catalyst file or the synthetic pulse
//! - plans: list, inspect and step persisted plans
//! - config: print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tempora - multi-frequency loop kernel and temporal plan engine
#[derive(Parser, Debug)]
#[command(name = "tempora")]
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
    pub command: Commands,
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
    /// Run the kernel until the cycle limit, end of input, or Ctrl-C
    Run {
        /// Stop after this many master ticks
        #[arg(short = 'n', long)]
        cycles: Option<u64>,

        /// Read catalysts from a JSONL file instead of the synthetic pulse
        #[arg(long)]
        catalysts: Option<PathBuf>,

        /// Accept intuitions at or above this confidence (default: intuition.threshold)
        #[arg(long)]
        accept_above: Option<f64>,

        /// Defer intuitions at or above this confidence instead of rejecting them
        #[arg(long)]
        defer_above: Option<f64>,

        /// Master ticks each synthetic pulse mood is held for
        #[arg(long, default_value_t = 20)]
        pulse_hold: u64,
    },

    /// Inspect and drive persisted plans
    Plans {
        #[command(subcommand)]
        command: PlanCommands,
    },

    /// Print the effective configuration as YAML
    Config,
}

/// Plan subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum PlanCommands {
    /// List stored plans
    List {
        /// Filter by status (draft, active, suspended, completed, abandoned)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show one plan with its actions
    Show {
        /// Plan ID
        id: String,
    },

    /// Resume a plan in this session and complete up to N steps
    Resume {
        /// Plan ID
        id: String,

        /// Steps to complete
        #[arg(short, long, default_value_t = 1)]
        steps: u32,
    },

    /// Suspend an active plan
    Suspend {
        /// Plan ID
        id: String,
    },

    /// Abandon a live plan
    Abandon {
        /// Plan ID
        id: String,
    },
}
