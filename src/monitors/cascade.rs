//! Cascading health check: HEAD, then GET, then a raw TCP connect
//!
//! ```text
//! HEAD ──2xx/3xx/403──▶ up
//!   │ ──other status──▶ down "HTTP <code>"
//!   │ 405 / transport failure
//!   ▼
//! GET  ──2xx/3xx/403──▶ up
//!   │ ──other status──▶ down "HTTP <code>"
//!   │ transport failure
//!   ▼
//! TCP  ──connected────▶ up "HTTP blocked but TCP reachable"
//!      ──failed───────▶ down <GET failure reason>
//! ```
//!
//! The response time is measured from the start of the cascade, so it
//! includes every stage that ran.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use reqwest::Method;
use tracing::{instrument, trace};
use url::Url;

use super::tcp::TcpProbe;
use crate::actors::settings_sync::LiveSettings;
use crate::net::ConnectionPool;
use crate::{CheckResult, CheckStatus, Job};

pub const TCP_FALLBACK_REASON: &str = "HTTP blocked but TCP reachable";

/// Classification of a final HTTP status code
///
/// 403 counts as up: the site answered, it just refuses automated clients.
pub fn classify_status(code: u16) -> (CheckStatus, Option<String>) {
    match code {
        200..400 | 403 => (CheckStatus::Up, None),
        other => (CheckStatus::Down, Some(format!("HTTP {other}"))),
    }
}

pub struct HealthChecker {
    pool: ConnectionPool,
    tcp: TcpProbe,
    settings: Arc<LiveSettings>,
}

impl HealthChecker {
    pub fn new(pool: ConnectionPool, tcp: TcpProbe, settings: Arc<LiveSettings>) -> Self {
        Self {
            pool,
            tcp,
            settings,
        }
    }

    /// Run the cascade for one job. Always produces exactly one result.
    #[instrument(skip(self, job), fields(entity = job.entity_id, url = %job.url))]
    pub async fn check(&self, job: &Job) -> CheckResult {
        let started = Instant::now();

        let (status, error_reason) = match Url::parse(&job.url) {
            Ok(url) => self.cascade(&url).await,
            Err(e) => (CheckStatus::Down, Some(format!("invalid URL: {e}"))),
        };

        let response_time_ms = started.elapsed().as_millis() as u64;
        trace!("{status} after {response_time_ms}ms ({error_reason:?})");

        CheckResult {
            entity_id: job.entity_id,
            url: job.url.clone(),
            status,
            response_time_ms: Some(response_time_ms),
            error_reason,
            checked_at: Utc::now(),
        }
    }

    async fn cascade(&self, url: &Url) -> (CheckStatus, Option<String>) {
        let timeout = self.settings.request_timeout();

        match self.pool.send(Method::HEAD, url, timeout).await {
            Ok(405) => trace!("HEAD not allowed, falling back to GET"),
            Ok(code) => return classify_status(code),
            Err(e) => trace!("HEAD failed ({e}), falling back to GET"),
        }

        let get_error = match self.pool.send(Method::GET, url, timeout).await {
            Ok(code) => return classify_status(code),
            Err(e) => e,
        };
        trace!("GET failed ({get_error}), falling back to TCP");

        match self.tcp.connect(url).await {
            Ok(()) => (CheckStatus::Up, Some(TCP_FALLBACK_REASON.to_string())),
            Err(tcp_error) => {
                trace!("TCP probe failed ({tcp_error})");
                (CheckStatus::Down, Some(get_error.reason()))
            }
        }
    }
}
