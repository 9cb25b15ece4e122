use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use sitewatch::{actors::LiveSettings, app, config, telemetry};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, trace, warn};

/// Pull queued checks, probe the sites and persist the results
#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: Option<String>,

    /// Print every persisted check as a JSON line on stdout
    #[arg(long)]
    emit_events: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init("sitewatch_worker");
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = config::load(args.file.as_deref())?;
    let services = app::open_services(&config.storage).await?;

    let live = Arc::new(LiveSettings::from_config(&config));
    let settings_sync = app::start_settings_sync(&services, &config, live.clone()).await;

    let worker = app::start_worker(&services, &config, live)?;

    if args.emit_events {
        let mut events = worker.persister.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => {
                            let mut stdout = std::io::stdout().lock();
                            let _ = writeln!(stdout, "{line}");
                        }
                        Err(e) => warn!("failed to encode check event: {e}"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("event output lagged, skipped {skipped} events")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    app::shutdown_signal().await;

    worker.stop().await?;
    settings_sync.shutdown().await?;
    info!("worker stopped");

    Ok(())
}
