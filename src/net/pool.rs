//! Connection pool shared by every probe of a worker process
//!
//! A single `reqwest::Client` keeps connections alive between probes of the
//! same origin. The client only bounds *idle* connections, so the number of
//! simultaneous requests per origin is capped separately with one semaphore
//! per origin. Requests are HTTP/1.1 only, one in flight per connection.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, redirect};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;
use url::Url;

use super::dns::DnsCache;
use crate::config::HttpConfig;
use crate::monitors::ProbeError;

/// Presented as a regular browser, some sites reject unknown agents outright
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

/// At most this much of a GET body is read before the connection is released
const MAX_BODY_BYTES: usize = 128 * 1024;

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
    );
    headers
}

#[derive(Clone)]
pub struct ConnectionPool {
    client: reqwest::Client,
    origin_limits: Arc<DashMap<String, Arc<Semaphore>>>,
    max_per_origin: usize,
}

impl ConnectionPool {
    pub fn new(config: &HttpConfig, dns: &DnsCache) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .dns_resolver(Arc::new(dns.clone()))
            .default_headers(browser_headers())
            .redirect(redirect::Policy::limited(config.max_redirects))
            .pool_max_idle_per_host(config.max_connections_per_host)
            .pool_idle_timeout(Duration::from_secs(config.keep_alive_secs))
            .http1_only();

        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }

        Ok(Self {
            client: builder.build()?,
            origin_limits: Arc::new(DashMap::new()),
            max_per_origin: config.max_connections_per_host.max(1),
        })
    }

    /// Number of requests currently holding a slot for the origin of `url`
    pub fn in_flight(&self, url: &Url) -> usize {
        self.origin_limits
            .get(&origin_key(url))
            .map(|sem| self.max_per_origin - sem.available_permits())
            .unwrap_or(0)
    }

    async fn acquire(&self, url: &Url) -> Result<OwnedSemaphorePermit, ProbeError> {
        let semaphore = self
            .origin_limits
            .entry(origin_key(url))
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_origin)))
            .clone();

        semaphore
            .acquire_owned()
            .await
            .map_err(|_| ProbeError::Other("origin limiter closed".to_string()))
    }

    /// Send one request and return the final status code after redirects
    ///
    /// `timeout` covers the whole exchange, headers and body. For GET the body
    /// is read (up to a limit) and discarded; a failure while reading it is a
    /// transport failure like any other.
    pub async fn send(
        &self,
        method: Method,
        url: &Url,
        timeout: Duration,
    ) -> Result<u16, ProbeError> {
        let _permit = self.acquire(url).await?;

        trace!("{method} {url}");
        let mut response = self
            .client
            .request(method.clone(), url.clone())
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status().as_u16();

        if method == Method::GET {
            let mut read = 0;
            while let Some(chunk) = response.chunk().await? {
                read += chunk.len();
                if read >= MAX_BODY_BYTES {
                    break;
                }
            }
        }

        Ok(status)
    }
}

fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}
