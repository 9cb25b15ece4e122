//! Tracing subscriber setup shared by all binaries

use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_LEVEL: &str = "SITEWATCH_LOG";

fn level_from_env() -> LevelFilter {
    std::env::var(LOG_LEVEL)
        .ok()
        .and_then(|level| LevelFilter::from_str(&level).ok())
        .unwrap_or(LevelFilter::INFO)
}

/// Install the global subscriber, logging this crate and the given binary target
pub fn init(binary: &'static str) {
    let level = level_from_env();
    let filter = filter::Targets::new().with_targets(vec![("sitewatch", level), (binary, level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}
