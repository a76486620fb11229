//! Routing helpers shared with dialer selection

pub mod domain_matcher;

pub use domain_matcher::{DomainMatcher, LinearDomainMatcher, RoutingDomainKey};
