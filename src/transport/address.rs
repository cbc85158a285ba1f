//! Address parsing and resolution (spec.md §6.4), grounded on
//! `RPC/Address.cc`'s `Address::refresh`: comma-split host list,
//! `host[:port]` / bracketed-IPv6 parsing, a default port fallback, and
//! random selection among resolved candidates.

use rand::seq::SliceRandom;
use tokio::net::lookup_host;

/// One entry of a comma-delimited address list the caller supplied, plus
/// whatever it resolved to last time [`Address::refresh`] ran.
#[derive(Debug, Clone)]
pub struct Address {
    /// The string the caller originally passed in (spec.md §6.4).
    original_string: String,
    /// The numeric string most recently resolved to, if any.
    resolved_string: Option<String>,
    default_port: u16,
}

impl Address {
    pub fn new(original_string: impl Into<String>, default_port: u16) -> Address {
        Address { original_string: original_string.into(), resolved_string: None, default_port }
    }

    pub fn original_string(&self) -> &str {
        &self.original_string
    }

    pub fn resolved_string(&self) -> Option<&str> {
        self.resolved_string.as_deref()
    }

    pub fn is_valid(&self) -> bool {
        self.resolved_string.is_some()
    }

    /// Splits `original_string` on `,` into individual `host[:port]`
    /// entries. Each caller of [`Address`] is expected to iterate these
    /// (one [`Address`] per comma-delimited list member) rather than
    /// [`Address`] doing the split internally — mirrors
    /// `RPC::Address::Address` taking one already-split host string.
    pub fn split_entries(list: &str) -> Vec<String> {
        list.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
    }

    fn parse_host_port(entry: &str, default_port: u16) -> (String, u16) {
        if let Some(rest) = entry.strip_prefix('[') {
            // Bracketed IPv6: "[::1]:1234" or "[::1]".
            if let Some(end) = rest.find(']') {
                let host = &rest[..end];
                let after = &rest[end + 1..];
                let port = after
                    .strip_prefix(':')
                    .and_then(|p| p.parse::<u16>().ok())
                    .unwrap_or(default_port);
                return (host.to_string(), port);
            }
        }
        match entry.rsplit_once(':') {
            Some((host, port_str)) if !host.contains(':') => {
                match port_str.parse::<u16>() {
                    Ok(port) => (host.to_string(), port),
                    Err(_) => (entry.to_string(), default_port),
                }
            }
            // A bare IPv6 address (multiple colons, no brackets) or a host
            // with no port: use the whole thing as the host.
            _ => (entry.to_string(), default_port),
        }
    }

    /// Re-resolves `original_string` via DNS, picking uniformly at random
    /// among the resulting candidates (spec.md §6.4), and records the
    /// winner as `resolved_string`. Leaves `resolved_string` at `None` (and
    /// [`Address::is_valid`] false) if resolution fails or yields nothing.
    pub async fn refresh(&mut self) {
        let (host, port) = Self::parse_host_port(&self.original_string, self.default_port);
        let lookup = format!("{host}:{port}");
        match lookup_host(&lookup).await {
            Ok(iter) => {
                let candidates: Vec<_> = iter.collect();
                let mut rng = rand::thread_rng();
                self.resolved_string = candidates.choose(&mut rng).map(|a| a.to_string());
            }
            Err(_) => {
                self.resolved_string = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_comma_delimited_list() {
        assert_eq!(
            Address::split_entries("a:1, b:2 ,c"),
            vec!["a:1".to_string(), "b:2".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn parses_host_and_port() {
        assert_eq!(Address::parse_host_port("host:1234", 5254), ("host".to_string(), 1234));
        assert_eq!(Address::parse_host_port("host", 5254), ("host".to_string(), 5254));
    }

    #[test]
    fn strips_brackets_from_ipv6() {
        assert_eq!(Address::parse_host_port("[::1]:1234", 5254), ("::1".to_string(), 1234));
        assert_eq!(Address::parse_host_port("[::1]", 5254), ("::1".to_string(), 5254));
    }

    #[test]
    fn bare_ipv6_without_brackets_is_used_whole() {
        let (host, port) = Address::parse_host_port("::1", 5254);
        assert_eq!(host, "::1");
        assert_eq!(port, 5254);
    }
}
