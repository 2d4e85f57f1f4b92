use anyhow::{Context, Result};
use clap::Parser;
use workout_sync::cli::{Cli, Command};
use workout_sync::scenario::{self, Scenario};
use workout_sync::SyncConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(cli.log_filter()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = SyncConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Command::Replay { scenario: path } => {
            let scenario = Scenario::load(&path)?;
            let report = scenario::replay(scenario, &config).await?;
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            println!("{}", json);
        }
        Command::Config => {
            let yaml = serde_yaml::to_string(&config).context("Failed to serialize config")?;
            print!("{}", yaml);
        }
    }

    Ok(())
}
