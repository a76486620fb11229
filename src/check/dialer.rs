//! Dialer connectivity checking
//!
//! A `Dialer` tracks reachability of one egress path for the four probe
//! classes. `activate_check` starts the background loop:
//!
//! - all four classes are checked once right away
//! - a ticker (started after a random offset in `[0, interval)`) and
//!   `notify_check` both feed a capacity-1 trigger queue; triggers arriving
//!   while one is pending are dropped
//! - each trigger checks, concurrently, every class that has subscribers and
//!   waits for all of them before taking the next trigger

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::collection::{
    AliveDialerSet, Collections, IpVersion, L4Proto, NetworkKey, SubscriberHandle,
};
use super::error::CheckError;
use super::latency::LatencyWindow;
use super::option::{CheckOptionCache, TcpCheckOption, UdpCheckOption};
use super::probe::ProbeKind;
use crate::net::{Resolver, Transport};

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime settings of a dialer's checks
#[derive(Debug, Clone)]
pub struct DialerOption {
    pub name: String,
    pub check_interval: Duration,
    pub check_timeout: Duration,
    /// URL fetched by the TCP probe
    pub tcp_check_url: String,
    /// `host:port` of the DNS server used by the UDP probe
    pub udp_check_dns: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProbeSource {
    /// Use the dialer's configured check targets
    Configured,
    Explicit(ProbeKind),
}

/// One class plus the probe to run for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOption {
    key: NetworkKey,
    source: ProbeSource,
}

impl CheckOption {
    /// Probe the dialer's configured target for this class
    pub fn configured(l4proto: L4Proto, ip_version: IpVersion) -> Self {
        Self {
            key: NetworkKey::new(l4proto, ip_version),
            source: ProbeSource::Configured,
        }
    }

    /// Run `probe` and record the result under its class
    pub fn explicit(ip_version: IpVersion, probe: ProbeKind) -> Self {
        let l4proto = match probe {
            ProbeKind::Http { .. } => L4Proto::Tcp,
            ProbeKind::Dns { .. } => L4Proto::Udp,
        };
        Self {
            key: NetworkKey::new(l4proto, ip_version),
            source: ProbeSource::Explicit(probe),
        }
    }

    pub fn key(&self) -> NetworkKey {
        self.key
    }
}

pub struct Dialer {
    name: String,
    check_interval: Duration,
    check_timeout: Duration,
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn Resolver>,
    cancel: CancellationToken,

    /// One lock for liveness, latencies and subscribers of all four classes
    collections: Mutex<Collections>,

    tcp_check_option: CheckOptionCache<TcpCheckOption>,
    udp_check_option: CheckOptionCache<UdpCheckOption>,

    check_enabled: Mutex<bool>,
    check_tx: mpsc::Sender<Instant>,
    check_rx: Mutex<Option<mpsc::Receiver<Instant>>>,
}

impl Dialer {
    pub fn new(
        option: DialerOption,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn Resolver>,
    ) -> Arc<Self> {
        let check_interval = if option.check_interval < MIN_CHECK_INTERVAL {
            warn!(
                node = %option.name,
                "check interval {:?} too small, using {:?}",
                option.check_interval,
                MIN_CHECK_INTERVAL
            );
            MIN_CHECK_INTERVAL
        } else {
            option.check_interval
        };
        let (check_tx, check_rx) = mpsc::channel(1);

        Arc::new(Self {
            name: option.name,
            check_interval,
            check_timeout: option.check_timeout,
            transport,
            resolver,
            cancel: CancellationToken::new(),
            collections: Mutex::new(Collections::new()),
            tcp_check_option: CheckOptionCache::new(option.tcp_check_url),
            udp_check_option: CheckOptionCache::new(option.udp_check_dns),
            check_enabled: Mutex::new(false),
            check_tx,
            check_rx: Mutex::new(Some(check_rx)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn check_timeout(&self) -> Duration {
        self.check_timeout
    }

    pub fn is_check_enabled(&self) -> bool {
        *self.check_enabled.lock()
    }

    /// Stop the background loop; in-flight checks finish on their own timeout
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Start periodic checking. Idempotent. Must run inside a Tokio runtime.
    ///
    /// The background loop only holds a weak handle: dropping the last
    /// `Arc<Dialer>` stops it just like `close` does.
    pub fn activate_check(self: &Arc<Self>) {
        let mut enabled = self.check_enabled.lock();
        if *enabled {
            return;
        }
        let Some(check_rx) = self.check_rx.lock().take() else {
            return;
        };
        *enabled = true;
        info!(
            node = %self.name,
            interval = ?self.check_interval,
            "Starting connectivity checks"
        );

        // Check once immediately.
        for key in NetworkKey::ALL {
            let dialer = self.clone();
            let timeout = self.check_timeout;
            tokio::spawn(async move {
                let option = CheckOption::configured(key.l4proto, key.ip_version);
                let _ = dialer.check(timeout, &option).await;
            });
        }

        self.spawn_ticker();
        tokio::spawn(alive_background(
            Arc::downgrade(self),
            self.name.clone(),
            self.cancel.clone(),
            check_rx,
        ));
    }

    /// Ask for a check cycle soon. Dropped if one is already pending.
    pub fn notify_check(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        // Full queue: the check is in process.
        let _ = self.check_tx.try_send(Instant::now());
    }

    pub fn register_alive_dialer_set(
        &self,
        set: Arc<dyn AliveDialerSet>,
        l4proto: L4Proto,
        ip_version: IpVersion,
    ) {
        let key = NetworkKey::new(l4proto, ip_version);
        self.collections
            .lock()
            .must_get_mut(key)
            .register(SubscriberHandle::new(set));
    }

    pub fn unregister_alive_dialer_set(
        &self,
        set: Arc<dyn AliveDialerSet>,
        l4proto: L4Proto,
        ip_version: IpVersion,
    ) {
        let key = NetworkKey::new(l4proto, ip_version);
        self.collections
            .lock()
            .must_get_mut(key)
            .unregister(&SubscriberHandle::new(set));
    }

    pub fn must_get_alive(&self, l4proto: L4Proto, ip_version: IpVersion) -> bool {
        self.collections
            .lock()
            .must_get(NetworkKey::new(l4proto, ip_version))
            .alive
    }

    /// Snapshot of the latency window
    pub fn must_get_latencies(&self, l4proto: L4Proto, ip_version: IpVersion) -> LatencyWindow {
        self.collections
            .lock()
            .must_get(NetworkKey::new(l4proto, ip_version))
            .latencies
            .clone()
    }

    fn has_subscribers(&self, key: NetworkKey) -> bool {
        self.collections.lock().must_get(key).has_subscribers()
    }

    /// Run one probe, record the verdict and notify subscribers of its class
    ///
    /// A failure of any kind records `timeout` as the latency sample.
    pub async fn check(&self, timeout: Duration, option: &CheckOption) -> Result<bool, CheckError> {
        let key = option.key();
        let start = Instant::now();
        let result = match tokio::time::timeout(timeout, self.probe(option)).await {
            Ok(result) => result.map_err(CheckError::normalize),
            Err(_) => Err(CheckError::Timeout),
        };
        let latency = start.elapsed();

        let mut collections = self.collections.lock();
        let collection = collections.must_get_mut(key);
        match &result {
            Ok(true) => {
                collection.latencies.append_latency(latency);
                let (avg, _) = collection.latencies.avg_latency();
                debug!(
                    network = %key,
                    node = %self.name,
                    last = ?truncate_millis(latency),
                    avg_10 = ?truncate_millis(avg),
                    "Connectivity Check"
                );
                collection.alive = true;
            }
            _ => {
                if let Err(err) = &result {
                    debug!(
                        network = %key,
                        node = %self.name,
                        err = %err,
                        "Connectivity Check Failed"
                    );
                }
                collection.latencies.append_latency(timeout);
                collection.alive = false;
            }
        }

        let alive = collection.alive;
        for subscriber in collection.subscribers() {
            subscriber.notify(self, alive);
        }
        result
    }

    async fn probe(&self, option: &CheckOption) -> Result<bool, CheckError> {
        let probe = match &option.source {
            ProbeSource::Explicit(probe) => probe.clone(),
            ProbeSource::Configured => self.configured_probe(option.key()).await?,
        };
        probe.probe(self.transport.as_ref()).await
    }

    async fn configured_probe(&self, key: NetworkKey) -> Result<ProbeKind, CheckError> {
        match key.l4proto {
            L4Proto::Tcp => {
                let opt = self.tcp_check_option.option(&self.resolver).await?;
                let ip = opt
                    .ip46
                    .for_version(key.ip_version)
                    .ok_or(CheckError::NoAddress(key.ip_version))?;
                Ok(ProbeKind::Http {
                    url: opt.url.clone(),
                    ip,
                })
            }
            L4Proto::Udp => {
                let opt = self.udp_check_option.option(&self.resolver).await?;
                let ip = opt
                    .ip46
                    .for_version(key.ip_version)
                    .ok_or(CheckError::NoAddress(key.ip_version))?;
                Ok(ProbeKind::Dns {
                    endpoint: SocketAddr::new(ip, opt.dns_port),
                })
            }
        }
    }

    /// One cycle: check every subscribed class concurrently and wait for all
    async fn run_cycle(self: &Arc<Self>) {
        let timeout = self.check_timeout;
        let mut cycle = JoinSet::new();
        for key in NetworkKey::ALL {
            // No need to check if no dialer selection policy uses its latency.
            if !self.has_subscribers(key) {
                continue;
            }
            let dialer = self.clone();
            cycle.spawn(async move {
                let option = CheckOption::configured(key.l4proto, key.ip_version);
                let _ = dialer.check(timeout, &option).await;
            });
        }
        // Barrier: the next trigger waits for this whole cycle.
        while cycle.join_next().await.is_some() {}
    }

    /// Splice a jittered ticker into the trigger queue
    fn spawn_ticker(&self) {
        let cycle = self.check_interval;
        let cancel = self.cancel.clone();
        let check_tx = self.check_tx.clone();

        tokio::spawn(async move {
            // Sleep to avoid avalanche.
            let offset = jitter(cycle);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(offset) => {}
            }

            let mut ticker = interval_at(Instant::now() + cycle, cycle);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    tick = ticker.tick() => {
                        let _ = check_tx.try_send(tick);
                    }
                }
            }
        });
    }
}

impl Drop for Dialer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Trigger consumer; exits on close, or once the dialer is gone
async fn alive_background(
    dialer: Weak<Dialer>,
    name: String,
    cancel: CancellationToken,
    mut check_rx: mpsc::Receiver<Instant>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            trigger = check_rx.recv() => {
                if trigger.is_none() {
                    break;
                }
            }
        }
        let Some(dialer) = dialer.upgrade() else {
            break;
        };
        dialer.run_cycle().await;
    }

    debug!(node = %name, "Connectivity checks stopped");
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialer")
            .field("name", &self.name)
            .field("check_interval", &self.check_interval)
            .field("check_timeout", &self.check_timeout)
            .field("tcp_check_url", &self.tcp_check_option.raw())
            .field("udp_check_dns", &self.udp_check_option.raw())
            .finish()
    }
}

/// Uniform offset in `[0, cycle)`
fn jitter(cycle: Duration) -> Duration {
    if cycle.is_zero() {
        return Duration::ZERO;
    }
    rand::thread_rng().gen_range(Duration::ZERO..cycle)
}

fn truncate_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{DirectTransport, SystemResolver};

    fn option() -> DialerOption {
        DialerOption {
            name: "test".into(),
            check_interval: Duration::from_millis(10),
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            tcp_check_url: "http://192.0.2.1/generate_204".into(),
            udp_check_dns: "192.0.2.53:53".into(),
        }
    }

    #[test]
    fn test_jitter_bounds() {
        let cycle = Duration::from_secs(30);
        for _ in 0..100 {
            assert!(jitter(cycle) < cycle);
        }
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_truncate_millis() {
        assert_eq!(
            truncate_millis(Duration::from_micros(12_345)),
            Duration::from_millis(12)
        );
    }

    #[test]
    fn test_explicit_option_class() {
        let http = CheckOption::explicit(
            IpVersion::V6,
            ProbeKind::Http {
                url: "http://example.test/".parse().unwrap(),
                ip: "2001:db8::1".parse().unwrap(),
            },
        );
        assert_eq!(http.key(), NetworkKey::new(L4Proto::Tcp, IpVersion::V6));

        let dns = CheckOption::explicit(
            IpVersion::V4,
            ProbeKind::Dns {
                endpoint: "192.0.2.53:53".parse().unwrap(),
            },
        );
        assert_eq!(dns.key().to_string(), "udp4");
    }

    #[tokio::test]
    async fn test_interval_is_clamped() {
        let dialer = Dialer::new(option(), Arc::new(DirectTransport), Arc::new(SystemResolver));
        assert_eq!(dialer.check_interval(), MIN_CHECK_INTERVAL);
        assert!(!dialer.is_check_enabled());
    }

    #[tokio::test]
    async fn test_activate_is_idempotent_and_close_stops_notify() {
        let dialer = Dialer::new(option(), Arc::new(DirectTransport), Arc::new(SystemResolver));
        dialer.activate_check();
        dialer.activate_check();
        assert!(dialer.is_check_enabled());

        dialer.close();
        assert!(dialer.is_closed());
        dialer.notify_check();
    }
}
