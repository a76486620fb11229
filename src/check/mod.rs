//! Connectivity Checks
//!
//! Per-dialer health checking, split by probe class:
//! - TCP: HTTP(S) GET of `tcp_check_url`, connection forced to the resolved IP
//! - UDP: DNS A query through the dialer to `udp_check_dns`
//!
//! each for IPv4 and IPv6. Results feed a rolling latency window and a
//! liveness flag per class, and are pushed to registered `AliveDialerSet`s.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dialer_check::check::{Dialer, DialerOption, IpVersion, L4Proto};
//! use dialer_check::net::{DirectTransport, SystemResolver};
//!
//! let dialer = Dialer::new(option, Arc::new(DirectTransport), Arc::new(SystemResolver));
//! dialer.register_alive_dialer_set(group.clone(), L4Proto::Tcp, IpVersion::V4);
//! dialer.activate_check();
//!
//! if dialer.must_get_alive(L4Proto::Tcp, IpVersion::V4) {
//!     let (avg, _) = dialer.must_get_latencies(L4Proto::Tcp, IpVersion::V4).avg_latency();
//! }
//! ```

pub mod collection;
pub mod dialer;
pub mod error;
pub mod latency;
pub mod option;
pub mod probe;

pub use collection::{AliveDialerSet, IpVersion, L4Proto, NetworkKey, SubscriberHandle};
pub use dialer::{CheckOption, Dialer, DialerOption, DEFAULT_CHECK_INTERVAL, DEFAULT_CHECK_TIMEOUT};
pub use error::CheckError;
pub use latency::{LatencyWindow, LATENCY_WINDOW_SIZE};
pub use option::{CheckOptionCache, TcpCheckOption, UdpCheckOption};
pub use probe::{ProbeKind, UDP_CHECK_LOOKUP_HOST};
