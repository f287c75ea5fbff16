/*
[INPUT]:  CLI arguments, YAML configuration file, environment, OS shutdown signals
[OUTPUT]: Logged stream events until shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coinbase_stream_tail::{TailConfig, build_client, run};

#[derive(Parser, Debug)]
#[command(name = "coinbase-stream-tail", version, about = "Tail the Coinbase streaming feed")]
struct Cli {
    #[arg(long = "config", value_name = "PATH", default_value = "coinbase-stream.yaml")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    /// Emit logs as JSON lines
    #[arg(long = "json-logs")]
    json_logs: bool,
    /// Validate and print the resolved configuration, then exit
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting coinbase-stream-tail"
    );

    let config = TailConfig::load(&args.config_path)?;
    info!(
        url = %config.url,
        channel_count = config.channels.len(),
        authenticated = config.credentials.is_some(),
        "configuration loaded"
    );

    if args.dry_run {
        let resolved = serde_yaml::to_string(&config).context("render configuration")?;
        println!("{resolved}");
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let client = build_client(&config)?;
    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let summary = run(client, &config, shutdown).await?;
    info!(total_events = summary.total(), summary = ?summary, "tail finished");

    Ok(())
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .context("invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
