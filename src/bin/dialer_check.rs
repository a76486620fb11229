//! Dialer Check Service
//!
//! Runs the connectivity checks for the host's direct egress path and logs
//! liveness transitions and rolling latencies.
//!
//! Usage:
//!   dialer_check --config dialer_check.toml
//!   dialer_check --once
//!
//! Environment Variables:
//!   DIALER_CHECK_CONFIG_PATH - Path to TOML config file
//!   DIALER_CHECK_LOG_LEVEL - Log level (default: info)

use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use tracing::{info, warn};

use dialer_check::check::{AliveDialerSet, CheckOption, Dialer, NetworkKey};
use dialer_check::config::CheckConfig;
use dialer_check::logging;
use dialer_check::net::{DirectTransport, SystemResolver};

#[derive(Parser, Debug)]
#[command(name = "dialer_check")]
#[command(about = "Connectivity health checks for an outbound dialer")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "DIALER_CHECK_CONFIG_PATH")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "DIALER_CHECK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Check every class once, print the verdicts and exit
    #[arg(long)]
    once: bool,
}

/// Logs liveness transitions of one class
struct LogAliveSet {
    key: NetworkKey,
    last: Mutex<Option<bool>>,
}

impl AliveDialerSet for LogAliveSet {
    fn notify_latency_change(&self, dialer: &Dialer, alive: bool) {
        let mut last = self.last.lock();
        if *last != Some(alive) {
            if alive {
                info!(network = %self.key, node = dialer.name(), "dialer is alive");
            } else {
                warn!(network = %self.key, node = dialer.name(), "dialer is not alive");
            }
            *last = Some(alive);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level)?;

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        info!("Loading config from {}", config_path);
        CheckConfig::load(config_path)?
    } else {
        info!("No --config given, trying dialer_check.toml");
        CheckConfig::from_env()
    };
    info!(
        "Checking {} every {:?} (tcp: {}, udp: {})",
        config.name, config.check_interval, config.tcp_check_url, config.udp_check_dns
    );

    let dialer = Dialer::new(
        config.dialer_option(),
        Arc::new(DirectTransport),
        Arc::new(SystemResolver),
    );

    if args.once {
        return run_once(&dialer).await;
    }

    let mut sets = Vec::new();
    for key in NetworkKey::ALL {
        let set: Arc<dyn AliveDialerSet> = Arc::new(LogAliveSet {
            key,
            last: Mutex::new(None),
        });
        dialer.register_alive_dialer_set(set.clone(), key.l4proto, key.ip_version);
        sets.push((key, set));
    }
    dialer.activate_check();

    let reporter = {
        let dialer = dialer.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dialer.check_interval());
            loop {
                interval.tick().await;
                report(&dialer);
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    reporter.abort();
    for (key, set) in sets {
        dialer.unregister_alive_dialer_set(set, key.l4proto, key.ip_version);
    }
    dialer.close();
    Ok(())
}

async fn run_once(dialer: &Dialer) -> anyhow::Result<()> {
    let timeout = dialer.check_timeout();
    let mut failures = 0;
    for key in NetworkKey::ALL {
        let option = CheckOption::configured(key.l4proto, key.ip_version);
        match dialer.check(timeout, &option).await {
            Ok(true) => {
                let latency = dialer
                    .must_get_latencies(key.l4proto, key.ip_version)
                    .last_latency()
                    .unwrap_or_default();
                println!("{:<5} ok    {:?}", key.to_string(), latency);
            }
            Ok(false) => {
                failures += 1;
                println!("{:<5} fail  unexpected status", key.to_string());
            }
            Err(e) if e.is_option_error() => {
                failures += 1;
                println!("{:<5} fail  {} (check configuration)", key.to_string(), e);
            }
            Err(e) => {
                failures += 1;
                println!("{:<5} fail  {}", key.to_string(), e);
            }
        }
    }
    if failures == NetworkKey::ALL.len() {
        anyhow::bail!("{} is not reachable by any probe", dialer.name());
    }
    Ok(())
}

fn report(dialer: &Dialer) {
    for key in NetworkKey::ALL {
        let alive = dialer.must_get_alive(key.l4proto, key.ip_version);
        let (avg, count) = dialer
            .must_get_latencies(key.l4proto, key.ip_version)
            .avg_latency();
        info!(
            network = %key,
            node = dialer.name(),
            alive,
            avg_10 = ?avg,
            samples = count,
            "status"
        );
    }
}
