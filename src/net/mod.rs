//! Shared network plumbing for the probe cascade
//!
//! - [`dns::DnsCache`]: hostname to address cache with a fixed TTL, plugged
//!   into the HTTP client as its resolver
//! - [`pool::ConnectionPool`]: one keep-alive HTTP client per worker, with a
//!   cap on simultaneous requests per origin

pub mod dns;
pub mod pool;

pub use dns::{DnsCache, DnsCacheEntry, ResolveError};
pub use pool::ConnectionPool;
