//! Per-class liveness state
//!
//! Every dialer owns exactly four collections, one per combination of
//! {TCP, UDP} x {IPv4, IPv6}. Each holds the last verdict, the rolling latency
//! window, and the reference-counted set of subscribers interested in it.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use super::dialer::Dialer;
use super::latency::LatencyWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum L4Proto {
    Tcp,
    Udp,
}

impl L4Proto {
    pub fn as_str(&self) -> &'static str {
        match self {
            L4Proto::Tcp => "tcp",
            L4Proto::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersion::V4 => "4",
            IpVersion::V6 => "6",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipv{}", self.as_str())
    }
}

/// One probe class, e.g. `tcp4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkKey {
    pub l4proto: L4Proto,
    pub ip_version: IpVersion,
}

impl NetworkKey {
    /// In collection index order
    pub const ALL: [NetworkKey; 4] = [
        NetworkKey::new(L4Proto::Tcp, IpVersion::V4),
        NetworkKey::new(L4Proto::Tcp, IpVersion::V6),
        NetworkKey::new(L4Proto::Udp, IpVersion::V4),
        NetworkKey::new(L4Proto::Udp, IpVersion::V6),
    ];

    pub const fn new(l4proto: L4Proto, ip_version: IpVersion) -> Self {
        Self { l4proto, ip_version }
    }

    fn index(&self) -> usize {
        match (self.l4proto, self.ip_version) {
            (L4Proto::Tcp, IpVersion::V4) => 0,
            (L4Proto::Tcp, IpVersion::V6) => 1,
            (L4Proto::Udp, IpVersion::V4) => 2,
            (L4Proto::Udp, IpVersion::V6) => 3,
        }
    }
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.l4proto.as_str(), self.ip_version.as_str())
    }
}

impl FromStr for NetworkKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NetworkKey::ALL
            .into_iter()
            .find(|key| key.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                anyhow::anyhow!("invalid network key {:?} (want tcp4|tcp6|udp4|udp6)", s)
            })
    }
}

/// Consumer of liveness changes, typically a dialer-selection group
///
/// Called synchronously while the dialer's collection lock is held: the
/// handler must not block and must not call back into the same dialer.
pub trait AliveDialerSet: Send + Sync {
    fn notify_latency_change(&self, dialer: &Dialer, alive: bool);
}

/// Identity of a subscriber: the address of the shared set object
#[derive(Clone)]
pub struct SubscriberHandle(Arc<dyn AliveDialerSet>);

impl SubscriberHandle {
    pub fn new(set: Arc<dyn AliveDialerSet>) -> Self {
        Self(set)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn notify(&self, dialer: &Dialer, alive: bool) {
        self.0.notify_latency_change(dialer, alive);
    }
}

impl PartialEq for SubscriberHandle {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for SubscriberHandle {}

impl Hash for SubscriberHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberHandle({:#x})", self.addr())
    }
}

#[derive(Debug)]
pub struct Collection {
    pub alive: bool,
    pub latencies: LatencyWindow,
    /// Reference counted: the same set may be registered by several policies
    subscribers: HashMap<SubscriberHandle, usize>,
}

impl Collection {
    fn new() -> Self {
        Self {
            // Optimistic until the first verdict.
            alive: true,
            latencies: LatencyWindow::default(),
            subscribers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handle: SubscriberHandle) {
        *self.subscribers.entry(handle).or_insert(0) += 1;
    }

    pub fn unregister(&mut self, handle: &SubscriberHandle) {
        if let Some(count) = self.subscribers.get_mut(handle) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.subscribers.remove(handle);
            }
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, handle: &SubscriberHandle) -> usize {
        self.subscribers.get(handle).copied().unwrap_or(0)
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &SubscriberHandle> {
        self.subscribers.keys()
    }
}

/// The four collections of a dialer, indexed by `NetworkKey`
#[derive(Debug)]
pub struct Collections {
    inner: [Collection; 4],
}

impl Collections {
    pub fn new() -> Self {
        Self {
            inner: [
                Collection::new(),
                Collection::new(),
                Collection::new(),
                Collection::new(),
            ],
        }
    }

    pub fn must_get(&self, key: NetworkKey) -> &Collection {
        &self.inner[key.index()]
    }

    pub fn must_get_mut(&mut self, key: NetworkKey) -> &mut Collection {
        &mut self.inner[key.index()]
    }
}

impl Default for Collections {
    fn default() -> Self {
        Self::new()
    }
}
