//! Check target parsing and the resolve-once cache
//!
//! `tcp_check_url` and `udp_check_dns` are raw strings from configuration.
//! They are parsed and resolved lazily on first use and memoized. A failed
//! resolution is not cached, and it triggers a refresh of the system resolver.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::error::CheckError;
use crate::net::{Ip46, Resolver};

/// Deadline for one parse + resolve attempt
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolved `tcp_check_url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpCheckOption {
    pub url: Url,
    pub ip46: Ip46,
}

/// Resolved `udp_check_dns`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpCheckOption {
    pub dns_host: String,
    pub dns_port: u16,
    pub ip46: Ip46,
}

/// A check target that can be built from its raw configuration string
#[async_trait]
pub trait ParseCheckOption: Sized + Send + Sync + 'static {
    /// Configuration key, used as error context
    const OPTION_NAME: &'static str;

    async fn parse(raw: &str, resolver: &dyn Resolver) -> Result<Self, CheckError>;
}

#[async_trait]
impl ParseCheckOption for TcpCheckOption {
    const OPTION_NAME: &'static str = "tcp_check_url";

    async fn parse(raw: &str, resolver: &dyn Resolver) -> Result<Self, CheckError> {
        let url = Url::parse(raw)?;
        let host = url
            .host_str()
            .ok_or_else(|| CheckError::MissingHost(raw.to_string()))?;
        let ip46 = resolve_host(resolver, host).await?;
        Ok(Self { url, ip46 })
    }
}

#[async_trait]
impl ParseCheckOption for UdpCheckOption {
    const OPTION_NAME: &'static str = "udp_check_dns";

    async fn parse(raw: &str, resolver: &dyn Resolver) -> Result<Self, CheckError> {
        let (host, port) = split_host_port(raw)?;
        let dns_port = port
            .parse::<u16>()
            .map_err(|e| CheckError::BadPort(e.to_string()))?;
        let ip46 = resolve_host(resolver, host).await?;
        Ok(Self {
            dns_host: host.to_string(),
            dns_port,
            ip46,
        })
    }
}

/// Split `host:port` / `[v6]:port` without interpreting the port
pub fn split_host_port(addr: &str) -> Result<(&str, &str), CheckError> {
    let err = |reason| CheckError::SplitHostPort {
        addr: addr.to_string(),
        reason,
    };

    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let end = rest.find(']').ok_or_else(|| err("missing ']' in address"))?;
        let host = &rest[..end];
        match &rest[end + 1..] {
            "" => return Err(err("missing port in address")),
            tail => match tail.strip_prefix(':') {
                Some(port) => (host, port),
                None => return Err(err("unexpected character after ']' in address")),
            },
        }
    } else {
        let colon = addr.rfind(':').ok_or_else(|| err("missing port in address"))?;
        let host = &addr[..colon];
        if host.contains(':') {
            return Err(err("too many colons in address"));
        }
        (host, &addr[colon + 1..])
    };

    if host.contains('[') || host.contains(']') || port.contains('[') || port.contains(']') {
        return Err(err("unexpected bracket in address"));
    }
    Ok((host, port))
}

async fn resolve_host(resolver: &dyn Resolver, host: &str) -> Result<Ip46, CheckError> {
    // `Url::host_str` keeps the brackets around IPv6 literals
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(Ip46::from_ip(ip));
    }
    resolver
        .resolve_ip46(host)
        .await
        .map_err(|source| CheckError::Resolve {
            host: host.to_string(),
            source,
        })
}

/// Lazily resolved check target guarded by its own lock
///
/// Only successes are memoized; after a failure the next call resolves again.
pub struct CheckOptionCache<T> {
    raw: String,
    resolved: Mutex<Option<Arc<T>>>,
}

impl<T: ParseCheckOption> CheckOptionCache<T> {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            resolved: Mutex::new(None),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Resolved option, resolving on first use or after a failure
    pub async fn option(&self, resolver: &Arc<dyn Resolver>) -> Result<Arc<T>, CheckError> {
        let mut resolved = self.resolved.lock().await;
        if let Some(opt) = &*resolved {
            return Ok(opt.clone());
        }

        let parse = T::parse(&self.raw, resolver.as_ref());
        let result = match tokio::time::timeout(RESOLVE_TIMEOUT, parse).await {
            Ok(result) => result,
            Err(_) => Err(CheckError::Timeout),
        };

        match result {
            Ok(opt) => {
                let opt = Arc::new(opt);
                *resolved = Some(opt.clone());
                Ok(opt)
            }
            Err(err) => {
                spawn_system_refresh(resolver.clone());
                Err(CheckError::Option {
                    option: T::OPTION_NAME,
                    source: Box::new(err),
                })
            }
        }
    }

    #[cfg(test)]
    async fn is_resolved(&self) -> bool {
        self.resolved.lock().await.is_some()
    }
}

fn spawn_system_refresh(resolver: Arc<dyn Resolver>) {
    tokio::spawn(async move {
        if let Err(e) = resolver.refresh_system().await {
            debug!("system resolver refresh failed: {}", e);
        }
    });
}
