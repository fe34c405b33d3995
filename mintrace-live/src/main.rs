mod grpc;
mod rpc;
mod session;
mod wss;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use grpc::GrpcAdapter;
use mintrace_core::config::{
    DEFAULT_LOG_LOCATION, DEFAULT_LOG_SIGNATURE, DEFAULT_MINT_INDEX, DEFAULT_PROGRAM_ID, WSOL_MINT,
};
use mintrace_core::validation::validate_log_location;
use mintrace_core::{
    create_store, ExtractionMode, GrpcConfig, HealthCheck, HealthStatus, Metrics, MintExtractor,
    MintPipeline, ProgramConfig, ProgramMatcher, ReconnectPolicy, Recorder, RecorderHandle,
    RetryPolicy, Source, WssConfig,
};
use rpc::RpcTransactionFetcher;
use session::Session;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wss::WssAdapter;

/// Mintrace Live - race two Solana delivery paths for new token mints
#[derive(Parser)]
#[command(name = "mintrace-live")]
#[command(about = "Record when Yellowstone gRPC and WebSocket logs each report a new mint", long_about = None)]
struct Cli {
    #[command(flatten)]
    program: ProgramArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run only the Yellowstone gRPC adapter
    Grpc(GrpcArgs),
    /// Run only the WebSocket logsSubscribe adapter
    Wss(WssArgs),
    /// Run both adapters side by side
    Run {
        #[command(flatten)]
        grpc: GrpcArgs,
        #[command(flatten)]
        wss: WssArgs,
    },
}

#[derive(Args)]
struct ProgramArgs {
    /// Program whose mints are tracked
    #[arg(long, env = "MINTRACE_PROGRAM_ID", default_value = DEFAULT_PROGRAM_ID)]
    program_id: String,

    /// Comma-separated log lines that identify a mint
    #[arg(long, env = "MINTRACE_LOG_SIGNATURES", default_value = DEFAULT_LOG_SIGNATURE)]
    log_signatures: String,

    /// Comma-separated hex instruction discriminators
    #[arg(long, env = "MINTRACE_DISCRIMINATORS", default_value = "181ec828051c0777")]
    discriminators: String,

    /// Wrapped SOL mint, never reported as a new token
    #[arg(long, env = "MINTRACE_WSOL_MINT", default_value = WSOL_MINT)]
    wsol_mint: String,

    /// Account key index of the mint (account-keys extraction)
    #[arg(long, env = "MINTRACE_MINT_INDEX", default_value_t = DEFAULT_MINT_INDEX)]
    mint_index: usize,

    /// Observation log: a .json file, a .jsonl file or sqlite:<path>
    #[arg(long, env = "MINTRACE_LOG", default_value = DEFAULT_LOG_LOCATION)]
    log: String,

    /// Seconds between metrics summaries (0 disables them)
    #[arg(long, default_value_t = 60)]
    summary_interval_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Extraction {
    TokenBalances,
    AccountKeys,
}

#[derive(Args, Clone)]
struct GrpcArgs {
    /// Yellowstone gRPC endpoint
    #[arg(long, env = "SVS_GRPC_HTTP")]
    grpc_endpoint: Option<String>,

    /// Yellowstone access token
    #[arg(long, env = "SVS_GRPC_XTOKEN", hide_env_values = true)]
    x_token: Option<String>,

    /// Where the mint address is read from
    #[arg(long, value_enum, default_value = "token-balances")]
    extraction: Extraction,
}

#[derive(Args, Clone)]
struct WssArgs {
    /// WebSocket endpoint for logsSubscribe
    #[arg(long, env = "SVS_SWQOS_WSS")]
    ws_url: Option<String>,

    /// RPC endpoint for getTransaction
    #[arg(long, env = "SVS_SWQOS_RPC")]
    rpc_url: Option<String>,

    /// Extra transaction fetch attempts when the node has no metadata yet
    #[arg(long, default_value_t = 0)]
    fetch_retries: u32,

    /// First retry delay in milliseconds, growing linearly
    #[arg(long, default_value_t = 100)]
    fetch_retry_delay_ms: u64,

    /// Initial reconnect delay in milliseconds
    #[arg(long, default_value_t = 5000)]
    reconnect_initial_ms: u64,

    /// Reconnect delay cap in milliseconds
    #[arg(long, default_value_t = 60000)]
    reconnect_max_ms: u64,

    /// Always wait the initial delay instead of backing off
    #[arg(long)]
    fixed_reconnect: bool,

    /// Consecutive failed connections before giving up (unlimited if unset)
    #[arg(long)]
    max_reconnects: Option<u32>,
}

impl ProgramArgs {
    fn to_config(&self) -> Result<ProgramConfig> {
        Ok(ProgramConfig::from_parts(
            &self.program_id,
            &self.log_signatures,
            &self.discriminators,
            self.mint_index,
            &self.wsol_mint,
        )?)
    }
}

impl GrpcArgs {
    fn extraction_mode(&self, program: &ProgramConfig) -> ExtractionMode {
        match self.extraction {
            Extraction::TokenBalances => ExtractionMode::TokenBalances,
            Extraction::AccountKeys => ExtractionMode::AccountKeys {
                mint_index: program.mint_index,
            },
        }
    }
}

impl WssArgs {
    fn fetch_retry(&self) -> RetryPolicy {
        if self.fetch_retries == 0 {
            return RetryPolicy::none();
        }
        RetryPolicy::linear(
            self.fetch_retries + 1,
            Duration::from_millis(self.fetch_retry_delay_ms),
        )
    }

    fn reconnect(&self) -> ReconnectPolicy {
        let initial = Duration::from_millis(self.reconnect_initial_ms);
        let policy = if self.fixed_reconnect {
            ReconnectPolicy::fixed(initial)
        } else {
            ReconnectPolicy::exponential(initial, Duration::from_millis(self.reconnect_max_ms), 0.2)
        };
        policy.with_max_attempts(self.max_reconnects)
    }
}

/// One running adapter
struct Running {
    source: Source,
    session: Arc<Session>,
    metrics: Arc<Metrics>,
    task: JoinHandle<mintrace_core::Result<()>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let program = cli.program.to_config()?;
    validate_log_location(&cli.program.log)?;

    info!("Starting Mintrace Live");
    info!("Program: {}", program.program_id);
    info!("Log signatures: {:?}", program.log_signatures);
    info!("Discriminators: {}", program.discriminators.len());

    let store = create_store(&cli.program.log).await?;
    let (recorder, recorder_task) = Recorder::spawn(store, 256);

    let mut running = Vec::new();
    match &cli.command {
        Commands::Grpc(args) => running.extend(start_grpc(args, &program, &recorder)),
        Commands::Wss(args) => running.extend(start_wss(args, &program, &recorder)),
        Commands::Run { grpc, wss } => {
            running.extend(start_grpc(grpc, &program, &recorder));
            running.extend(start_wss(wss, &program, &recorder));
        }
    }
    drop(recorder);

    if running.is_empty() {
        error!("No adapter could be started, check endpoint configuration");
        return Ok(());
    }

    let sessions: Vec<Arc<Session>> = running.iter().map(|r| r.session.clone()).collect();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping adapters...");
            for session in &sessions {
                session.stop();
            }
        }
    });

    let summary = spawn_summary(
        running.iter().map(|r| (r.session.clone(), r.metrics.clone())).collect(),
        cli.program.summary_interval_secs,
    );

    for adapter in running {
        match adapter.task.await {
            Ok(Ok(())) => info!("[{}] Adapter finished", adapter.source),
            Ok(Err(e)) => error!("[{}] Adapter failed: {}", adapter.source, e),
            Err(e) => error!("[{}] Adapter task panicked: {}", adapter.source, e),
        }
        adapter.metrics.log_summary();
    }

    if let Some(summary) = summary {
        summary.abort();
    }

    // All handles are gone once the adapters return, so this drains pending writes
    if let Err(e) = recorder_task.await {
        error!("Recorder task failed: {}", e);
    }

    info!("Mintrace Live stopped");
    Ok(())
}

fn build_pipeline(
    source: Source,
    program: &ProgramConfig,
    mode: ExtractionMode,
    recorder: &RecorderHandle,
) -> Arc<MintPipeline> {
    Arc::new(MintPipeline::new(
        source,
        ProgramMatcher::new(program),
        MintExtractor::new(program.wsol_mint.clone(), mode),
        recorder.clone(),
        Arc::new(Metrics::new(source)),
    ))
}

fn start_grpc(args: &GrpcArgs, program: &ProgramConfig, recorder: &RecorderHandle) -> Option<Running> {
    let config = GrpcConfig::new(args.grpc_endpoint.clone(), args.x_token.clone());
    if let Err(e) = config.credentials() {
        error!("Could not start gRPC stream: {}", e);
        return None;
    }

    let pipeline = build_pipeline(Source::Grpc, program, args.extraction_mode(program), recorder);
    let metrics = pipeline.metrics().clone();
    let session = Session::new(Source::Grpc);
    let adapter = GrpcAdapter::new(config, program.program_id.clone(), pipeline, session.clone());

    Some(Running {
        source: Source::Grpc,
        session,
        metrics,
        task: tokio::spawn(async move { adapter.run().await }),
    })
}

fn start_wss(args: &WssArgs, program: &ProgramConfig, recorder: &RecorderHandle) -> Option<Running> {
    let config = WssConfig::new(args.ws_url.clone(), args.rpc_url.clone());
    let fetcher = match config.endpoints() {
        Ok((_, rpc_url)) => Arc::new(RpcTransactionFetcher::new(rpc_url)),
        Err(e) => {
            error!("Could not start Websocket stream: {}", e);
            return None;
        }
    };
    info!("[wss] Fetching transactions from {}", fetcher.url());

    let pipeline = build_pipeline(Source::Wss, program, ExtractionMode::TokenBalances, recorder);
    let metrics = pipeline.metrics().clone();
    let session = Session::new(Source::Wss);
    let adapter = WssAdapter::new(config, program.program_id.clone(), pipeline, fetcher, session.clone())
        .with_fetch_retry(args.fetch_retry())
        .with_reconnect(args.reconnect());

    Some(Running {
        source: Source::Wss,
        session,
        metrics,
        task: tokio::spawn(async move { adapter.run().await }),
    })
}

fn spawn_summary(adapters: Vec<(Arc<Session>, Arc<Metrics>)>, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for (session, metrics) in &adapters {
                metrics.log_summary();
                let status = session.status();
                let health = HealthCheck::new(metrics.clone()).check();
                if health == HealthStatus::Healthy {
                    info!("[{}] connected: {}, health: {}", status.source, status.connected, health);
                } else {
                    warn!("[{}] connected: {}, health: {}", status.source, status.connected, health);
                }
            }
        }
    }))
}
