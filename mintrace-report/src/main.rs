use anyhow::Result;
use clap::Parser;
use mintrace_core::config::DEFAULT_LOG_LOCATION;
use mintrace_core::{analyze, create_store, ObservationStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Mintrace Report - compare gRPC and WebSocket arrival times
#[derive(Parser)]
#[command(name = "mintrace-report")]
#[command(about = "Pair recorded mint observations and print latency statistics", long_about = None)]
struct Cli {
    /// Observation log: a .json file, a .jsonl file or sqlite:<path>
    #[arg(long, env = "MINTRACE_LOG", default_value = DEFAULT_LOG_LOCATION)]
    log: String,

    /// Print the statistics as JSON instead of the text report
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match render(&cli.log, cli.json).await {
        Ok(Some(report)) => {
            println!("{}", report);
            info!("Benchmark statistics completed.");
        }
        Ok(None) => println!("No benchmark data found."),
        Err(e) => {
            error!("Error analyzing benchmark data: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Load the log and render the report, `None` when there is nothing to analyse
async fn render(log: &str, json: bool) -> Result<Option<String>> {
    let store = create_store(log).await?;
    let entries = store.load_entries().await?;
    info!("Loaded {} log entries from {}", entries.len(), store.location());

    let Some(stats) = analyze(&entries) else {
        return Ok(None);
    };

    if json {
        Ok(Some(serde_json::to_string_pretty(&stats)?))
    } else {
        Ok(Some(stats.to_string()))
    }
}
