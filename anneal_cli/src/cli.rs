//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "anneal", version, about = "Annealing process engine CLI")]
pub struct Cli {
    /// Path to the DAQ config TOML; omitted runs the simulator defaults
    #[arg(long = "daq-config", value_name = "FILE")]
    pub daq_config: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); falls back to the
    /// DAQ config's logging.level, then "info"
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a process file
    Run {
        /// Process file (JSON)
        process: PathBuf,

        /// Print per-channel sample counts on completion
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
    },
    /// Parse and validate a process file without running it
    Validate {
        /// Process file (JSON)
        process: PathBuf,
    },
    /// Quick health check (config parse + simulated DAQ round trip)
    SelfCheck,
}
