use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Package version followed by the commit it was built from.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("WORKOUT_SYNC_GIT_SHA"),
    ")"
);

#[derive(Parser)]
#[command(name = "workout-sync")]
#[command(about = "Replays workout edits through the mutation coordinator")]
#[command(version = VERSION)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Config file (defaults to $WORKOUT_SYNC_CONFIG, then ~/.workout-sync/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay a YAML scenario against the in-memory remote and print the outcome as JSON
    Replay { scenario: PathBuf },
    /// Print the effective configuration as YAML
    Config,
}

impl Cli {
    /// `RUST_LOG` wins over `-v` when set.
    pub fn log_filter(&self) -> String {
        if let Ok(filter) = std::env::var("RUST_LOG") {
            if !filter.is_empty() {
                return filter;
            }
        }
        match self.verbose {
            0 => "warn",
            1 => "workout_sync=debug",
            _ => "trace",
        }
        .to_string()
    }
}

#[cfg(test)]
#[path = "tests/cli_tests.rs"]
mod tests;
