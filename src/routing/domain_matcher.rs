//! Domain set matching
//!
//! Routing rules are compiled into numbered domain sets; matching a domain
//! yields a bitmap with bit `i` set when set `i` matched.

use std::str::FromStr;

use anyhow::{anyhow, Context};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingDomainKey {
    Full,
    Keyword,
    Suffix,
    Regex,
}

impl FromStr for RoutingDomainKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "keyword" => Ok(Self::Keyword),
            "suffix" => Ok(Self::Suffix),
            "regex" => Ok(Self::Regex),
            other => Err(anyhow!("unknown domain key {:?}", other)),
        }
    }
}

pub trait DomainMatcher {
    /// Number of sets, i.e. bits in every bitmap
    fn set_bit_length(&mut self, length: usize);
    fn add_set(&mut self, bit_index: usize, domains: &[String], key: RoutingDomainKey);
    fn build(&mut self) -> anyhow::Result<()>;
    fn match_domain_bitmap(&self, domain: &str) -> Vec<u32>;
}

enum Pattern {
    Full(String),
    Keyword(String),
    Suffix(String),
    Regex(Regex),
}

impl Pattern {
    fn matches(&self, domain: &str) -> bool {
        match self {
            Pattern::Full(full) => domain == full,
            Pattern::Keyword(word) => domain.contains(word.as_str()),
            Pattern::Suffix(suffix) => {
                domain == suffix
                    || (domain.len() > suffix.len()
                        && domain.ends_with(suffix.as_str())
                        && domain.as_bytes()[domain.len() - suffix.len() - 1] == b'.')
            }
            Pattern::Regex(re) => re.is_match(domain),
        }
    }
}

/// Straightforward matcher: every pattern is tried in turn
#[derive(Default)]
pub struct LinearDomainMatcher {
    bit_length: usize,
    pending: Vec<(usize, String, RoutingDomainKey)>,
    patterns: Vec<(usize, Pattern)>,
}

impl LinearDomainMatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

fn normalize(domain: &str) -> String {
    domain.trim_end_matches('.').to_ascii_lowercase()
}

impl DomainMatcher for LinearDomainMatcher {
    fn set_bit_length(&mut self, length: usize) {
        self.bit_length = length;
    }

    fn add_set(&mut self, bit_index: usize, domains: &[String], key: RoutingDomainKey) {
        self.pending
            .extend(domains.iter().map(|d| (bit_index, d.clone(), key)));
    }

    fn build(&mut self) -> anyhow::Result<()> {
        for (bit_index, domain, key) in self.pending.drain(..) {
            if bit_index >= self.bit_length {
                return Err(anyhow!(
                    "bit index {} out of range (length {})",
                    bit_index,
                    self.bit_length
                ));
            }
            let pattern = match key {
                RoutingDomainKey::Full => Pattern::Full(normalize(&domain)),
                RoutingDomainKey::Keyword => Pattern::Keyword(domain.to_ascii_lowercase()),
                RoutingDomainKey::Suffix => Pattern::Suffix(normalize(&domain)),
                RoutingDomainKey::Regex => Pattern::Regex(
                    Regex::new(&domain).with_context(|| format!("bad domain regex {:?}", domain))?,
                ),
            };
            self.patterns.push((bit_index, pattern));
        }
        Ok(())
    }

    fn match_domain_bitmap(&self, domain: &str) -> Vec<u32> {
        let mut bitmap = vec![0u32; (self.bit_length + 31) / 32];
        let domain = normalize(domain);
        for (bit_index, pattern) in &self.patterns {
            if bitmap[bit_index / 32] & (1 << (bit_index % 32)) != 0 {
                continue;
            }
            if pattern.matches(&domain) {
                bitmap[bit_index / 32] |= 1 << (bit_index % 32);
            }
        }
        bitmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_match_bitmap() {
        let mut m = LinearDomainMatcher::new();
        m.set_bit_length(40);
        m.add_set(0, &strings(&["example.com"]), RoutingDomainKey::Suffix);
        m.add_set(1, &strings(&["www.example.com"]), RoutingDomainKey::Full);
        m.add_set(2, &strings(&["google"]), RoutingDomainKey::Keyword);
        m.add_set(33, &strings(&[r"^api\d+\.test$"]), RoutingDomainKey::Regex);
        m.build().unwrap();

        assert_eq!(m.match_domain_bitmap("www.example.com."), vec![0b11, 0]);
        assert_eq!(m.match_domain_bitmap("notexample.com"), vec![0, 0]);
        assert_eq!(m.match_domain_bitmap("dns.google"), vec![0b100, 0]);
        assert_eq!(m.match_domain_bitmap("api42.test"), vec![0, 0b10]);
    }

    #[test]
    fn test_build_rejects_bad_input() {
        let mut m = LinearDomainMatcher::new();
        m.set_bit_length(1);
        m.add_set(1, &strings(&["a.test"]), RoutingDomainKey::Full);
        assert!(m.build().is_err());

        let mut m = LinearDomainMatcher::new();
        m.set_bit_length(1);
        m.add_set(0, &strings(&["("]), RoutingDomainKey::Regex);
        assert!(m.build().is_err());
    }

    #[test]
    fn test_domain_key_parse() {
        assert_eq!("suffix".parse::<RoutingDomainKey>().unwrap(), RoutingDomainKey::Suffix);
        assert!("geosite".parse::<RoutingDomainKey>().is_err());
    }
}
