//! Hostname resolution for check targets

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use tracing::debug;

use crate::check::IpVersion;

/// First IPv4 and first IPv6 candidate of a host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ip46 {
    pub ip4: Option<Ipv4Addr>,
    pub ip6: Option<Ipv6Addr>,
}

impl Ip46 {
    pub fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Self { ip4: Some(v4), ip6: None },
            IpAddr::V6(v6) => Self { ip4: None, ip6: Some(v6) },
        }
    }

    /// Keep the first candidate of each family
    pub fn from_candidates(ips: impl IntoIterator<Item = IpAddr>) -> Self {
        let mut out = Self::default();
        for ip in ips {
            match ip {
                IpAddr::V4(v4) if out.ip4.is_none() => out.ip4 = Some(v4),
                IpAddr::V6(v6) if out.ip6.is_none() => out.ip6 = Some(v6),
                _ => {}
            }
        }
        out
    }

    pub fn for_version(&self, version: IpVersion) -> Option<IpAddr> {
        match version {
            IpVersion::V4 => self.ip4.map(IpAddr::V4),
            IpVersion::V6 => self.ip6.map(IpAddr::V6),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ip4.is_none() && self.ip6.is_none()
    }
}

/// Resolves check targets
///
/// Lookups go out over the symmetric-NAT-safe direct path, never through a
/// full-cone mapping.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `host` to at most one address per family
    async fn resolve_ip46(&self, host: &str) -> io::Result<Ip46>;

    /// Best-effort refresh of the system resolver configuration
    async fn refresh_system(&self) -> io::Result<()>;
}

/// Resolver backed by the operating system (getaddrinfo)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve_ip46(&self, host: &str) -> io::Result<Ip46> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        let ip46 = Ip46::from_candidates(addrs.map(|a| a.ip()));
        if ip46.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address found for {}", host),
            ));
        }
        Ok(ip46)
    }

    async fn refresh_system(&self) -> io::Result<()> {
        // The OS owns this cache; nothing to invalidate from here.
        debug!("system resolver refresh requested");
        Ok(())
    }
}
