//! CLI argument parsing for the `js` binary

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "js")]
#[command(author, version, about = "Delayed job scheduler with priority dispatch", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit the configured jobs and run the scheduler for a while
    Run {
        /// How long to run before shutting down
        #[arg(short, long, default_value = "60")]
        duration_secs: u64,

        /// Override the configured worker count
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Print the resolved configuration
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}
