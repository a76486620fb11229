//! Probe strategies
//!
//! - HTTP: GET the check URL over a connection forced to one IP
//! - DNS: ask the check resolver for an A record through the dialer

use std::net::{IpAddr, SocketAddr};

use hickory_proto::rr::RecordType;
use hyper::header::{HOST, USER_AGENT};
use hyper::{Body, Method, Request};
use tracing::debug;
use url::{Position, Url};

use super::error::CheckError;
use crate::net::{dns, tls, Transport};

/// Hostname looked up by the DNS probe
pub const UDP_CHECK_LOOKUP_HOST: &str = "connectivitycheck.gstatic.com.";

const CHECK_USER_AGENT: &str = concat!("dialer-check/", env!("CARGO_PKG_VERSION"));

/// What a single check actually does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    /// GET `url` with the TCP connection dialed to `ip`
    Http { url: Url, ip: IpAddr },
    /// Resolve `UDP_CHECK_LOOKUP_HOST` against the server at `endpoint`
    Dns { endpoint: SocketAddr },
}

impl ProbeKind {
    /// `Ok(true)` reachable, `Ok(false)` answered but judged bad, `Err` failed
    pub async fn probe(&self, transport: &dyn Transport) -> Result<bool, CheckError> {
        match self {
            ProbeKind::Http { url, ip } => http_check(transport, url, *ip).await,
            ProbeKind::Dns { endpoint } => dns_check(transport, *endpoint).await,
        }
    }
}

/// HTTP(S) check with the connection forced to `ip`
pub async fn http_check(
    transport: &dyn Transport,
    url: &Url,
    ip: IpAddr,
) -> Result<bool, CheckError> {
    let host = url
        .host_str()
        .ok_or_else(|| CheckError::MissingHost(url.to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| CheckError::BadPort(format!("no port for scheme {}", url.scheme())))?;

    let stream = transport.dial_tcp(SocketAddr::new(ip, port)).await?;
    let stream = if url.scheme() == "https" {
        tls::connect(host.trim_start_matches('[').trim_end_matches(']'), stream).await?
    } else {
        stream
    };

    let (mut sender, conn) = hyper::client::conn::handshake(stream).await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("check connection ended: {}", e);
        }
    });

    let req = Request::builder()
        .method(Method::GET)
        .uri(&url[Position::BeforePath..Position::AfterQuery])
        .header(HOST, &url[Position::BeforeHost..Position::AfterPort])
        .header(USER_AGENT, CHECK_USER_AGENT)
        .body(Body::empty())?;

    let resp = sender.send_request(req).await.map_err(|e| {
        if e.is_timeout() {
            CheckError::Timeout
        } else {
            CheckError::Http(e)
        }
    })?;

    Ok(judge_status(url.path(), resp.status().as_u16()))
}

/// Status verdict for a check URL path
///
/// A last path segment `generate_<code>` asks for exactly `<code>`; anything
/// else accepts 2xx and 3xx.
pub fn judge_status(path: &str, status: u16) -> bool {
    let page = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if let Some(want) = page.strip_prefix("generate_") {
        return status.to_string() == want;
    }
    (200..400).contains(&status)
}

/// DNS check: at least one A record must come back
pub async fn dns_check(
    transport: &dyn Transport,
    endpoint: SocketAddr,
) -> Result<bool, CheckError> {
    let conn = transport.dial_udp(endpoint).await?;
    let addrs = dns::resolve(conn.as_ref(), UDP_CHECK_LOOKUP_HOST, RecordType::A).await?;
    if addrs.is_empty() {
        return Err(CheckError::NoRecord);
    }
    Ok(true)
}
