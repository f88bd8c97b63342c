//! filewatch CLI
//!
//! Watches one or more roots with the native or polling backend and prints
//! every reported event, as display lines or JSON.

use clap::Parser;
use color_eyre::eyre::Result;
use filewatch::{EventSignal, Hub};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Watch filesystem roots and print every reported event
#[derive(Debug, Parser)]
#[command(name = "filewatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Paths to watch
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Use the polling backend instead of native notifications
    #[arg(short, long, env = "FILEWATCH_POLL")]
    poll: bool,

    /// Polling interval in milliseconds
    #[arg(long, default_value = "100")]
    interval: u64,

    /// Maximum polling events per scan tick
    #[arg(long, default_value = "1000")]
    throttle: u64,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", env = "FILEWATCH_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let signal = EventSignal::new();
    let mut hub = Hub::new(Arc::new(signal.clone()))?;

    if cli.poll {
        hub.set_polling_interval(cli.interval, log_ack("polling interval"))?;
        hub.set_polling_throttle(cli.throttle, log_ack("polling throttle"))?;
    }

    for path in &cli.paths {
        let shown = path.display().to_string();
        let json = cli.json;
        hub.watch(
            path,
            cli.poll,
            Box::new({
                let shown = shown.clone();
                move |ack| {
                    if ack.success {
                        tracing::info!(channel_id = ack.channel_id, path = %shown, "watching");
                    } else {
                        tracing::error!(path = %shown, error = %ack.message, "watch failed");
                    }
                }
            }),
            Box::new(move |events| {
                for event in events {
                    if json {
                        match serde_json::to_string(event) {
                            Ok(line) => println!("{line}"),
                            Err(err) => tracing::error!(error = %err, "event not serialisable"),
                        }
                    } else {
                        println!("{event}");
                    }
                }
            }),
        )?;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = signal.wait() => hub.handle_events(),
            _ = &mut ctrl_c => break,
        }
    }

    tracing::info!("shutting down");
    hub.shutdown();
    Ok(())
}

fn log_ack(what: &'static str) -> filewatch::AckCallback {
    Box::new(move |ack| {
        if ack.success {
            tracing::debug!(what, "applied");
        } else {
            tracing::warn!(what, error = %ack.message, "rejected");
        }
    })
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    Ok(())
}
