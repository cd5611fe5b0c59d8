//! Subcommand execution

use tracing::info;

use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::Result;
use crate::scenario;

pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
    match command {
        Commands::Simulate {
            scenario,
            latency_ms,
            json,
        } => {
            let report = scenario::run(scenario, &config, latency_ms).await?;
            if json {
                for outcome in &report.outcomes {
                    println!("{}", serde_json::to_string(outcome)?);
                }
                println!("{}", serde_json::to_string(&report.stats)?);
            } else {
                for outcome in &report.outcomes {
                    println!("{}", outcome);
                }
                let queue = &report.stats.queue;
                println!(
                    "submitted {} | succeeded {} | resolved {} | ticks {}",
                    queue.submitted,
                    queue.succeeded,
                    queue.resolved(),
                    queue.ticks
                );
            }
            report.check()?;
            info!(?scenario, "Scenario passed");
            Ok(())
        }
        Commands::Config { preset, format } => {
            print!("{}", AppConfig::preset(preset).render(format)?);
            Ok(())
        }
    }
}
