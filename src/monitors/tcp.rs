//! Raw TCP connect probe, the last stage of the cascade

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use url::{Host, Url};

use super::ProbeError;
use crate::net::DnsCache;

pub const DEFAULT_PLAIN_PORT: u16 = 80;
pub const DEFAULT_SECURE_PORT: u16 = 443;

/// Connects to the host of a URL and closes the connection right away
///
/// The port comes from the scheme alone, a port in the URL is ignored: a
/// site whose HTTP port is closed may still answer on the standard one.
#[derive(Clone)]
pub struct TcpProbe {
    timeout: Duration,
    dns: DnsCache,
    plain_port: u16,
    secure_port: u16,
}

impl TcpProbe {
    pub fn new(timeout: Duration, dns: DnsCache) -> Self {
        Self {
            timeout,
            dns,
            plain_port: DEFAULT_PLAIN_PORT,
            secure_port: DEFAULT_SECURE_PORT,
        }
    }

    /// Probe other ports than 80 and 443
    pub fn with_ports(mut self, plain_port: u16, secure_port: u16) -> Self {
        self.plain_port = plain_port;
        self.secure_port = secure_port;
        self
    }

    /// Port probed for `url`: the secure port for https, the plain one otherwise
    pub fn port_for(&self, url: &Url) -> u16 {
        match url.scheme() {
            "https" => self.secure_port,
            _ => self.plain_port,
        }
    }

    async fn target(&self, url: &Url) -> Result<SocketAddr, ProbeError> {
        let ip = match url.host() {
            Some(Host::Ipv4(addr)) => IpAddr::V4(addr),
            Some(Host::Ipv6(addr)) => IpAddr::V6(addr),
            Some(Host::Domain(domain)) => self.dns.lookup(domain).await?,
            None => return Err(ProbeError::Other(format!("no host in {url}"))),
        };
        Ok(SocketAddr::new(ip, self.port_for(url)))
    }

    pub async fn connect(&self, url: &Url) -> Result<(), ProbeError> {
        let address = self.target(url).await?;
        debug!("TCP probe connecting to {address}");

        match timeout(self.timeout, TcpStream::connect(address)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(io_error)) => {
                debug!("TCP probe to {address} failed: {io_error}");
                Err(io_error.into())
            }
            Err(_) => {
                debug!("TCP probe to {address} timed out after {:?}", self.timeout);
                Err(ProbeError::Timeout)
            }
        }
    }
}
