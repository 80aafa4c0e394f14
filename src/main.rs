//! Timing Collector Binary Entry Point
//!
//! Polls DPLL and GNSS telemetry (`collect`) or checks GNSS versions
//! (`verify`). Core functionality is provided by the `timing_collector`
//! library crate.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use timing_collector::{
    AppConfig, Backend, ClusterClient, CollectorArgs, Context, JsonLinesSink, KubectlClient,
    PollOrchestrator, RunConfig, default_registry,
    config::{GNSS_COLLECTOR, parse_duration},
    verify_gnss_versions,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Timing Collector - timing hardware telemetry
#[derive(Parser, Debug)]
#[command(name = "timing-collector", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "TIMING_COLLECTOR_CONFIG"
    )]
    config: PathBuf,

    /// Log filter (overrides RUST_LOG), e.g. "debug" or "info,timing_collector=trace"
    #[arg(long, env = "TIMING_COLLECTOR_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll collectors until interrupted or the run duration elapses
    Collect {
        /// Poll interval (overrides config file)
        #[arg(long, env = "TIMING_COLLECTOR_INTERVAL", value_parser = parse_duration)]
        interval: Option<Duration>,

        /// Run duration (overrides config file)
        #[arg(long, env = "TIMING_COLLECTOR_DURATION", value_parser = parse_duration)]
        duration: Option<Duration>,

        /// JSON-lines output file (overrides config file)
        #[arg(short, long, env = "TIMING_COLLECTOR_OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Check GNSS firmware, protocol and gpsd versions against minimums
    Verify,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results.
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,timing_collector=debug".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = AppConfig::load(&cli.config)?;

    match cli.command {
        Command::Collect {
            interval,
            duration,
            output,
        } => {
            // CLI > ENV > config file
            if let Some(interval) = interval {
                config.interval = interval;
            }
            if duration.is_some() {
                config.duration = duration;
            }
            if output.is_some() {
                config.output = output;
            }
            config.validate()?;
            collect(&config).await
        }
        Command::Verify => verify(&config).await,
    }
}

fn cluster_client(config: &AppConfig) -> Arc<dyn ClusterClient> {
    let mut client = KubectlClient::new(&config.cluster.kubectl);
    if let Some(kubeconfig) = config.kubeconfig() {
        client = client.with_kubeconfig(kubeconfig);
    }
    if let Some(node) = &config.cluster.node_name {
        client = client.with_node(node);
    }
    Arc::new(client)
}

async fn collect(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let writer: Box<dyn Write + Send> = match &config.output {
        Some(path) => {
            tracing::info!("Writing records to: {}", path.display());
            Box::new(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?,
            )
        }
        None => Box::new(std::io::stdout()),
    };
    let sink = Arc::new(JsonLinesSink::new(writer));

    let run_config = RunConfig::from_app(config, sink).with_client(cluster_client(config));
    let registry = default_registry()?;
    let orchestrator = PollOrchestrator::build(&registry, &run_config).await?;

    tracing::info!(
        "Collectors: {:?}, interval: {}",
        orchestrator.states(),
        humantime::format_duration(orchestrator.interval())
    );
    tracing::info!("Press Ctrl+C to shutdown");

    let summary = orchestrator.run(shutdown_signal(config.duration)).await?;
    tracing::info!(
        "Shutdown complete: {} ticks, {} failed polls, {} cleanup failures",
        summary.ticks,
        summary.failed_polls,
        summary.cleanup_failures
    );
    Ok(())
}

async fn verify(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let interface = match config.collectors().get(GNSS_COLLECTOR) {
        Some(CollectorArgs::Gnss(args)) => args.interface.clone(),
        _ => return Err(format!("collector '{GNSS_COLLECTOR}' is not configured").into()),
    };

    let ctx =
        Context::resolve_for_app(Backend::DaemonExec, config, Some(cluster_client(config))).await?;

    let checks = verify_gnss_versions(&ctx, &interface).await?;
    println!("{}", serde_json::to_string_pretty(&checks)?);

    let failed: Vec<_> = checks.iter().filter(|c| !c.passed).map(|c| c.id.as_str()).collect();
    if failed.is_empty() {
        tracing::info!("All {} version checks passed", checks.len());
        Ok(())
    } else {
        Err(format!("version checks failed: {}", failed.join(", ")).into())
    }
}

/// Resolves on Ctrl+C, SIGTERM, or once `duration` has elapsed.
async fn shutdown_signal(duration: Option<Duration>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let elapsed = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
        _ = elapsed => {
            tracing::info!("Run duration elapsed");
        }
    }
}
