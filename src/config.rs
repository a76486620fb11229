//! Dialer Check Configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::check::{DialerOption, DEFAULT_CHECK_INTERVAL, DEFAULT_CHECK_TIMEOUT};

/// Main configuration for connectivity checking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Node name used in log records
    pub name: String,

    /// Period between check cycles
    #[serde(with = "duration_serde")]
    pub check_interval: Duration,

    /// Deadline of a single probe; also the latency recorded on failure
    #[serde(with = "duration_serde")]
    pub check_timeout: Duration,

    /// URL for the TCP probe. A last path segment `generate_<code>` expects exactly that status.
    pub tcp_check_url: String,

    /// DNS server `host:port` for the UDP probe
    pub udp_check_dns: String,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            name: "direct".into(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            tcp_check_url: "http://cp.cloudflare.com/generate_204".into(),
            udp_check_dns: "dns.google:53".into(),
        }
    }
}

impl CheckConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment or default path
    pub fn from_env() -> Self {
        let path = std::env::var("DIALER_CHECK_CONFIG_PATH")
            .unwrap_or_else(|_| "dialer_check.toml".to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default check config ({}): {:#}", path, e);
            Self::default()
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.check_interval.is_zero() {
            bail!("check_interval must be greater than zero");
        }
        if self.check_timeout.is_zero() {
            bail!("check_timeout must be greater than zero");
        }
        if self.tcp_check_url.trim().is_empty() {
            bail!("tcp_check_url is empty");
        }
        if self.udp_check_dns.trim().is_empty() {
            bail!("udp_check_dns is empty");
        }
        Ok(())
    }

    pub fn dialer_option(&self) -> DialerOption {
        DialerOption {
            name: self.name.clone(),
            check_interval: self.check_interval,
            check_timeout: self.check_timeout,
            tcp_check_url: self.tcp_check_url.clone(),
            udp_check_dns: self.udp_check_dns.clone(),
        }
    }
}

// Serde helper for Duration (using milliseconds for simplicity)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
