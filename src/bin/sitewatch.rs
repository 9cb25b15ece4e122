use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use sitewatch::{actors::LiveSettings, app, config, telemetry};
use tracing::{info, trace};

/// Scheduler and worker in a single process
#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init("sitewatch");
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = config::load(args.file.as_deref())?;
    let services = app::open_services(&config.storage).await?;

    let live = Arc::new(LiveSettings::from_config(&config));
    let settings_sync = app::start_settings_sync(&services, &config, live.clone()).await;

    if let Some(entities) = &config.entities {
        app::seed_entities(services.registry.as_ref(), entities, live.default_interval()).await?;
    }

    let worker = app::start_worker(&services, &config, live)?;
    let scheduler = app::start_scheduler(&services, &config);
    info!("sitewatch running");

    app::shutdown_signal().await;

    // Stop producing first so the worker's queue purge is final
    scheduler.shutdown().await?;
    worker.stop().await?;
    settings_sync.shutdown().await?;
    info!("sitewatch stopped");

    Ok(())
}
