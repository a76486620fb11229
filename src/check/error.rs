use std::io;

use thiserror::Error;

use super::collection::IpVersion;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("bad url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("url {0} has no host")]
    MissingHost(String),

    #[error("address {addr}: {reason}")]
    SplitHostPort { addr: String, reason: &'static str },

    #[error("bad port: {0}")]
    BadPort(String),

    #[error("resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Wraps a parse/resolve failure with the option it came from
    #[error("failed to parse {option}: {source}")]
    Option {
        option: &'static str,
        #[source]
        source: Box<CheckError>,
    },

    #[error("no {0} address for check target")]
    NoAddress(IpVersion),

    #[error("timeout")]
    Timeout,

    #[error("network is unreachable")]
    NetworkUnreachable,

    #[error("bad DNS response: no record")]
    NoRecord,

    #[error("bad DNS response: {0}")]
    BadDnsResponse(String),

    #[error("tls: {0}")]
    Tls(String),

    #[error("http: {0}")]
    Http(#[from] hyper::Error),

    #[error("build request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for CheckError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::TimedOut {
            CheckError::Timeout
        } else {
            CheckError::Io(err)
        }
    }
}

impl CheckError {
    /// Collapse the many spellings of "network is unreachable" into one
    pub fn normalize(self) -> Self {
        if self.to_string().contains("network is unreachable")
            || self.to_string().contains("Network is unreachable")
        {
            CheckError::NetworkUnreachable
        } else {
            self
        }
    }

    /// True when this error came from parsing or resolving a check target
    pub fn is_option_error(&self) -> bool {
        matches!(self, CheckError::Option { .. })
    }
}
