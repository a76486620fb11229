//! Dialer Check Library
//!
//! Connectivity health checks for outbound dialers: periodic and on-demand
//! probing per (L4 protocol, IP version), rolling latency history, and
//! liveness fan-out to dialer-selection groups.

pub mod check;
pub mod config;
pub mod logging;
pub mod net;
pub mod routing;

pub use check::{
    AliveDialerSet, CheckError, CheckOption, Dialer, DialerOption, IpVersion, L4Proto,
    LatencyWindow, NetworkKey, ProbeKind,
};
