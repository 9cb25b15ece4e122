//! Running statistics over completed checks, logged as periodic summaries

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::{CheckResult, CheckStatus, EntityId};

#[derive(Debug)]
struct Inner {
    total: u64,
    up: u64,
    down: u64,
    response_time_sum: u64,
    timed: u64,
    fastest: Option<(String, u64)>,
    slowest: Option<(String, u64)>,
    sites: HashSet<EntityId>,
    batches: u64,
    started: Instant,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            total: 0,
            up: 0,
            down: 0,
            response_time_sum: 0,
            timed: 0,
            fastest: None,
            slowest: None,
            sites: HashSet::new(),
            batches: 0,
            started: Instant::now(),
        }
    }
}

/// Shared by every check task of a worker
#[derive(Debug, Default)]
pub struct CheckStats {
    inner: Mutex<Inner>,
}

impl CheckStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: &CheckResult) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        inner.total += 1;
        match result.status {
            CheckStatus::Up => inner.up += 1,
            CheckStatus::Down => inner.down += 1,
        }
        inner.sites.insert(result.entity_id);

        if let Some(ms) = result.response_time_ms {
            inner.response_time_sum += ms;
            inner.timed += 1;

            if inner.fastest.as_ref().is_none_or(|(_, fastest)| ms < *fastest) {
                inner.fastest = Some((result.url.clone(), ms));
            }
            if inner.slowest.as_ref().is_none_or(|(_, slowest)| ms > *slowest) {
                inner.slowest = Some((result.url.clone(), ms));
            }
        }
    }

    /// Count one non-empty pull from the queue
    pub fn record_batch(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .batches += 1;
    }

    pub fn summary(&self) -> StatsSummary {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        StatsSummary {
            total: inner.total,
            up: inner.up,
            down: inner.down,
            uptime_percent: if inner.total == 0 {
                0.0
            } else {
                inner.up as f64 * 100.0 / inner.total as f64
            },
            average_response_ms: (inner.timed > 0).then(|| inner.response_time_sum / inner.timed),
            fastest: inner.fastest.clone(),
            slowest: inner.slowest.clone(),
            distinct_sites: inner.sites.len(),
            batches: inner.batches,
            elapsed: inner.started.elapsed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSummary {
    pub total: u64,
    pub up: u64,
    pub down: u64,
    pub uptime_percent: f64,
    pub average_response_ms: Option<u64>,
    pub fastest: Option<(String, u64)>,
    pub slowest: Option<(String, u64)>,
    pub distinct_sites: usize,
    pub batches: u64,
    pub elapsed: Duration,
}

impl Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} checks in {}s (up {}, down {}, uptime {:.2}%)",
            self.total,
            self.elapsed.as_secs(),
            self.up,
            self.down,
            self.uptime_percent
        )?;
        if let Some(avg) = self.average_response_ms {
            write!(f, ", avg {avg}ms")?;
        }
        if let Some((url, ms)) = &self.fastest {
            write!(f, ", fastest {url} ({ms}ms)")?;
        }
        if let Some((url, ms)) = &self.slowest {
            write!(f, ", slowest {url} ({ms}ms)")?;
        }
        write!(f, ", {} sites, {} batches", self.distinct_sites, self.batches)
    }
}
