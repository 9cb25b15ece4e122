//! DNS cache
//!
//! Only the first resolved address of a host is kept. Entries are replaced
//! lazily: a lookup that finds an entry older than the TTL resolves again.
//! There is no background eviction, the map only grows with distinct hosts.

use std::collections::HashMap;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tokio::sync::RwLock;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl From<&IpAddr> for AddressFamily {
    fn from(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DnsCacheEntry {
    pub address: IpAddr,
    pub family: AddressFamily,
    pub resolved_at: Instant,
}

impl DnsCacheEntry {
    fn new(address: IpAddr) -> Self {
        Self {
            address,
            family: AddressFamily::from(&address),
            resolved_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.resolved_at.elapsed() < ttl
    }
}

/// A hostname could not be resolved to any address
#[derive(Debug)]
pub struct ResolveError {
    pub host: String,
    pub source: Option<std::io::Error>,
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(e) => write!(f, "failed to resolve {}: {e}", self.host),
            None => write!(f, "no addresses found for {}", self.host),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as _)
    }
}

struct Inner {
    entries: RwLock<HashMap<String, DnsCacheEntry>>,
    ttl: Duration,
}

/// Cloneable handle to one shared cache
#[derive(Clone)]
pub struct DnsCache {
    inner: Arc<Inner>,
}

impl DnsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                ttl,
            }),
        }
    }

    /// Resolve `host`, answering from the cache while the entry is fresh
    pub async fn lookup(&self, host: &str) -> Result<IpAddr, ResolveError> {
        if let Some(entry) = self.cached(host).await {
            trace!("dns cache hit for {host}");
            return Ok(entry.address);
        }

        let address = resolve_first(host).await?;
        debug!("resolved {host} to {address}");

        self.inner
            .entries
            .write()
            .await
            .insert(host.to_string(), DnsCacheEntry::new(address));

        Ok(address)
    }

    /// The entry for `host`, if present and within the TTL
    pub async fn cached(&self, host: &str) -> Option<DnsCacheEntry> {
        self.inner
            .entries
            .read()
            .await
            .get(host)
            .filter(|entry| entry.is_fresh(self.inner.ttl))
            .copied()
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }
}

async fn resolve_first(host: &str) -> Result<IpAddr, ResolveError> {
    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ResolveError {
            host: host.to_string(),
            source: Some(e),
        })?;

    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| ResolveError {
            host: host.to_string(),
            source: None,
        })
}

impl Resolve for DnsCache {
    fn resolve(&self, name: Name) -> Resolving {
        let cache = self.clone();
        async move {
            let address = cache.lookup(name.as_str()).await?;
            // The connector fills in the port from the request URL
            let addrs: Addrs = Box::new(std::iter::once(SocketAddr::new(address, 0)));
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        }
        .boxed()
    }
}
