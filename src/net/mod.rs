//! Network collaborators used by the connectivity checks
//!
//! - `Transport`: opens TCP streams / UDP packet connections through a dialer's
//!   egress path
//! - `Resolver`: resolves check targets to IPv4/IPv6 candidates
//! - DNS wire helpers and the shared TLS client configuration

pub mod dns;
pub mod resolver;
pub mod tls;
pub mod transport;

pub use resolver::{Ip46, Resolver, SystemResolver};
pub use transport::{DirectTransport, PacketConn, ProxyStream, Transport};
