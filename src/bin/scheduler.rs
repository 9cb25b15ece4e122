use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use sitewatch::{actors::LiveSettings, app, config, telemetry};
use tracing::{info, trace};

/// Enqueue a check for every registered site whenever its interval elapses
#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init("sitewatch_scheduler");
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = config::load(args.file.as_deref())?;
    let services = app::open_services(&config.storage).await?;

    let live = Arc::new(LiveSettings::from_config(&config));
    let settings_sync = app::start_settings_sync(&services, &config, live.clone()).await;

    if let Some(entities) = &config.entities {
        app::seed_entities(services.registry.as_ref(), entities, live.default_interval()).await?;
    }

    let scheduler = app::start_scheduler(&services, &config);
    info!("scheduler running (tick {:?})", config.scheduler.tick());

    app::shutdown_signal().await;

    scheduler.shutdown().await?;
    settings_sync.shutdown().await?;
    info!("scheduler stopped");

    Ok(())
}
