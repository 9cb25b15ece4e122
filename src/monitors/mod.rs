//! Reachability probes
//!
//! [`cascade::HealthChecker`] runs the HEAD → GET → TCP sequence for one job,
//! [`tcp::TcpProbe`] is its last stage.

pub mod cascade;
pub mod tcp;

use std::fmt::Display;
use std::io::ErrorKind;

use crate::net::ResolveError;

pub use cascade::{HealthChecker, classify_status};
pub use tcp::TcpProbe;

/// Transport-level failure of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    Timeout,
    Dns,
    ConnectionRefused,
    ConnectionReset,
    Other(String),
}

impl ProbeError {
    /// Error code (or message) recorded as the check's `error_reason`
    pub fn reason(&self) -> String {
        match self {
            ProbeError::Timeout => "ETIMEDOUT".to_string(),
            ProbeError::Dns => "ENOTFOUND".to_string(),
            ProbeError::ConnectionRefused => "ECONNREFUSED".to_string(),
            ProbeError::ConnectionReset => "ECONNRESET".to_string(),
            ProbeError::Other(message) => message.clone(),
        }
    }

    fn from_io_kind(kind: ErrorKind) -> Option<Self> {
        match kind {
            ErrorKind::TimedOut => Some(ProbeError::Timeout),
            ErrorKind::ConnectionRefused => Some(ProbeError::ConnectionRefused),
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                Some(ProbeError::ConnectionReset)
            }
            _ => None,
        }
    }
}

impl Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason())
    }
}

impl std::error::Error for ProbeError {}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        ProbeError::from_io_kind(err.kind()).unwrap_or_else(|| ProbeError::Other(err.to_string()))
    }
}

impl From<ResolveError> for ProbeError {
    fn from(_: ResolveError) -> Self {
        ProbeError::Dns
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ProbeError::Timeout;
        }

        // The interesting part is usually a few levels down the chain
        let mut messages = vec![err.to_string()];
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            if cause.downcast_ref::<ResolveError>().is_some() {
                return ProbeError::Dns;
            }
            if let Some(mapped) = cause
                .downcast_ref::<std::io::Error>()
                .and_then(|io| ProbeError::from_io_kind(io.kind()))
            {
                return mapped;
            }
            messages.push(cause.to_string());
            source = cause.source();
        }

        ProbeError::Other(messages.join(": "))
    }
}
