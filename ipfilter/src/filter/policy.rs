//! Compiled IP filter policy

use super::trie::NetworkTrie;
use crate::config::schema::{PolicyDefinition, PolicyMode};
use crate::error::ConfigError;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::OnceLock;

/// A named policy, immutable once built
///
/// Address and network entries are parsed when the policy is built, so a
/// malformed entry fails the configuration load rather than a request. The
/// network trie is built from the parsed networks on first lookup.
#[derive(Debug)]
pub struct Policy {
    name: String,
    mode: PolicyMode,
    addresses: HashSet<IpAddr>,
    networks: Vec<IpNet>,
    block_unknown_source: bool,
    trie: OnceLock<NetworkTrie>,
}

impl Policy {
    /// Build a policy from its definition, validating every entry
    pub fn new(definition: &PolicyDefinition) -> Result<Self, ConfigError> {
        let addresses = definition
            .addresses
            .iter()
            .map(|value| {
                value
                    .trim()
                    .parse::<IpAddr>()
                    .map(|addr| addr.to_canonical())
                    .map_err(|_| ConfigError::InvalidAddress {
                        policy: definition.name.clone(),
                        value: value.clone(),
                    })
            })
            .collect::<Result<HashSet<_>, _>>()?;

        let networks = definition
            .networks
            .iter()
            .map(|value| {
                parse_network(value).ok_or_else(|| ConfigError::InvalidNetwork {
                    policy: definition.name.clone(),
                    value: value.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: definition.name.clone(),
            mode: definition.mode,
            addresses,
            networks,
            block_unknown_source: definition.block_unknown_source,
            trie: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    pub fn block_unknown_source(&self) -> bool {
        self.block_unknown_source
    }

    pub fn addresses(&self) -> &HashSet<IpAddr> {
        &self.addresses
    }

    /// Trie over the configured networks, built once on first use
    pub fn networks(&self) -> &NetworkTrie {
        self.trie
            .get_or_init(|| self.networks.iter().copied().collect())
    }

    /// Membership test: exact address match or inside a configured network
    pub fn matches(&self, addr: IpAddr) -> bool {
        self.addresses.contains(&addr) || self.networks().contains(addr)
    }

    /// Whether a known source address passes this policy
    ///
    /// Only meaningful for allow and block lists; a disabled policy is
    /// handled by the caller and fails closed here.
    pub fn is_allowed(&self, addr: IpAddr) -> bool {
        match self.mode {
            PolicyMode::AllowList => self.matches(addr),
            PolicyMode::BlockList => !self.matches(addr),
            PolicyMode::Disabled => false,
        }
    }
}

/// Parse "addr/prefix". Anything else, including a bare address or a prefix
/// longer than the family allows, is rejected.
///
/// Sources are compared in IPv4 form, so a network inside `::ffff:0:0/96` is
/// stored as the IPv4 network it covers.
fn parse_network(value: &str) -> Option<IpNet> {
    let mut parts = value.trim().split('/').filter(|part| !part.is_empty());
    let (addr, prefix) = match (parts.next(), parts.next(), parts.next()) {
        (Some(addr), Some(prefix), None) => (addr, prefix),
        _ => return None,
    };

    let addr: IpAddr = addr.trim().parse().ok()?;
    let prefix: u8 = prefix.trim().parse().ok()?;

    match addr {
        IpAddr::V4(addr) => Ipv4Net::new(addr, prefix).ok().map(IpNet::V4),
        IpAddr::V6(addr) => match addr.to_ipv4_mapped() {
            Some(v4) if prefix >= 96 => {
                Ipv4Net::new(v4, prefix - 96).ok().map(IpNet::V4)
            }
            _ => Ipv6Net::new(addr, prefix).ok().map(IpNet::V6),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_network() {
        assert_eq!(
            parse_network("127.0.0.0/24"),
            Some("127.0.0.0/24".parse().unwrap())
        );
        assert_eq!(
            parse_network(" 2001:db8::/32 "),
            Some("2001:db8::/32".parse().unwrap())
        );
        assert_eq!(parse_network("10.0.0.0/0"), Some("10.0.0.0/0".parse().unwrap()));

        assert_eq!(parse_network("10.0.0.1"), None);
        assert_eq!(parse_network("10.0.0.0/8/8"), None);
        assert_eq!(parse_network("10.0.0.0/33"), None);
        assert_eq!(parse_network("::/129"), None);
        assert_eq!(parse_network("10.0.0/8"), None);
        assert_eq!(parse_network("10.0.0.0/x"), None);
        assert_eq!(parse_network("/8"), None);
    }

    #[test]
    fn test_parse_mapped_network() {
        assert_eq!(
            parse_network("::ffff:10.0.0.0/104"),
            Some("10.0.0.0/8".parse().unwrap())
        );
        assert_eq!(parse_network("::ffff:0:0/96"), Some("0.0.0.0/0".parse().unwrap()));
        assert_eq!(
            parse_network("::ffff:192.0.2.1/128"),
            Some("192.0.2.1/32".parse().unwrap())
        );
        assert_eq!(parse_network("::ffff:10.0.0.0/129"), None);
        // Wider than the mapped block: stays an IPv6 network
        assert_eq!(parse_network("::ffff:0:0/80"), Some("::ffff:0:0/80".parse().unwrap()));
    }

    #[test]
    fn test_mapped_entries_match_ipv4_sources() {
        let def = PolicyDefinition::new("p", PolicyMode::BlockList)
            .with_addresses(["::ffff:127.0.0.1"])
            .with_networks(["::ffff:10.0.0.0/104"]);
        let policy = Policy::new(&def).unwrap();

        assert!(policy.addresses().contains(&ip("127.0.0.1")));
        assert!(!policy.is_allowed(ip("127.0.0.1")));
        assert!(!policy.is_allowed(ip("10.1.1.1")));
        assert!(policy.is_allowed(ip("11.0.0.1")));
    }

    #[test]
    fn test_invalid_entries_fail_construction() {
        let bad_address = PolicyDefinition::new("p", PolicyMode::AllowList)
            .with_addresses(["10.0.0.1", "not-an-ip"]);
        match Policy::new(&bad_address) {
            Err(ConfigError::InvalidAddress { policy, value }) => {
                assert_eq!(policy, "p");
                assert_eq!(value, "not-an-ip");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let bad_network =
            PolicyDefinition::new("p", PolicyMode::BlockList).with_networks(["10.0.0.0"]);
        assert!(matches!(
            Policy::new(&bad_network),
            Err(ConfigError::InvalidNetwork { .. })
        ));
    }

    #[test]
    fn test_addresses_deduplicated() {
        let def = PolicyDefinition::new("p", PolicyMode::AllowList)
            .with_addresses(["10.0.0.1", "10.0.0.1", "::1"]);
        let policy = Policy::new(&def).unwrap();
        assert_eq!(policy.addresses().len(), 2);
    }

    #[test]
    fn test_allow_list() {
        let def = PolicyDefinition::new("p", PolicyMode::AllowList)
            .with_addresses(["192.168.0.1"])
            .with_networks(["127.0.0.0/24"]);
        let policy = Policy::new(&def).unwrap();

        assert!(policy.is_allowed(ip("192.168.0.1")));
        assert!(policy.is_allowed(ip("127.0.0.255")));
        assert!(!policy.is_allowed(ip("127.0.1.1")));
        assert!(!policy.is_allowed(ip("192.168.0.2")));
    }

    #[test]
    fn test_allow_and_block_are_complements() {
        let addresses = ["10.0.0.1", "::1"];
        let networks = ["172.16.0.0/12", "2001:db8::/48"];
        let allow = Policy::new(
            &PolicyDefinition::new("a", PolicyMode::AllowList)
                .with_addresses(addresses)
                .with_networks(networks),
        )
        .unwrap();
        let block = Policy::new(
            &PolicyDefinition::new("b", PolicyMode::BlockList)
                .with_addresses(addresses)
                .with_networks(networks),
        )
        .unwrap();

        for addr in [
            "10.0.0.1",
            "10.0.0.2",
            "172.31.255.255",
            "172.32.0.0",
            "::1",
            "::2",
            "2001:db8:0:ffff::1",
            "2001:db8:1::1",
        ] {
            assert_ne!(allow.is_allowed(ip(addr)), block.is_allowed(ip(addr)), "{}", addr);
        }
    }

    #[test]
    fn test_disabled_fails_closed_when_asked_directly() {
        let policy = Policy::new(&PolicyDefinition::new("d", PolicyMode::Disabled)).unwrap();
        assert!(!policy.is_allowed(ip("10.0.0.1")));
    }

    #[test]
    fn test_trie_built_once_under_concurrency() {
        let def = PolicyDefinition::new("p", PolicyMode::AllowList)
            .with_networks(["10.0.0.0/8", "192.168.0.0/16"]);
        let policy = Arc::new(Policy::new(&def).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let policy = Arc::clone(&policy);
                std::thread::spawn(move || {
                    let addr = IpAddr::from([10, 0, 0, i as u8]);
                    (policy.is_allowed(addr), policy.networks() as *const NetworkTrie as usize)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|(allowed, _)| *allowed));
        assert!(results.windows(2).all(|w| w[0].1 == w[1].1));
        assert_eq!(policy.networks().len(), 2);
    }
}
