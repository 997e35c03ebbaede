//! Binary prefix trie answering "is this address inside any of these networks?"

use ipnet::IpNet;
use std::net::IpAddr;

/// One bit of branching. A terminal node means a registered network ends
/// here, so every address below it is a member.
#[derive(Debug, Default, Clone)]
struct TrieNode {
    zero: Option<Box<TrieNode>>,
    one: Option<Box<TrieNode>>,
    terminal: bool,
}

impl TrieNode {
    fn child(&self, bit: bool) -> Option<&TrieNode> {
        if bit {
            self.one.as_deref()
        } else {
            self.zero.as_deref()
        }
    }

    fn child_or_insert(&mut self, bit: bool) -> &mut TrieNode {
        let slot = if bit { &mut self.one } else { &mut self.zero };
        slot.get_or_insert_with(Box::default)
    }
}

/// Union of CIDR networks with O(address length) membership tests
///
/// IPv4 and IPv6 networks are kept under separate roots; an address is only
/// ever compared against networks of its own family. The trie is
/// write-once-then-read-only: there is no removal.
#[derive(Debug, Default, Clone)]
pub struct NetworkTrie {
    v4: TrieNode,
    v6: TrieNode,
    networks: usize,
}

impl NetworkTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a network. Host bits past the prefix length are ignored.
    pub fn insert(&mut self, network: IpNet) {
        let (bits, _) = left_aligned(network.addr());
        let mut node = match network {
            IpNet::V4(_) => &mut self.v4,
            IpNet::V6(_) => &mut self.v6,
        };

        for index in 0..u32::from(network.prefix_len()) {
            node = node.child_or_insert(bit_at(bits, index));
        }
        node.terminal = true;
        self.networks += 1;
    }

    /// Check whether the address falls inside at least one registered network
    pub fn contains(&self, addr: IpAddr) -> bool {
        let (bits, width) = left_aligned(addr);
        let mut node = match addr {
            IpAddr::V4(_) => &self.v4,
            IpAddr::V6(_) => &self.v6,
        };

        // A /0 network marks the root itself
        if node.terminal {
            return true;
        }

        for index in 0..width {
            match node.child(bit_at(bits, index)) {
                Some(next) => node = next,
                None => return false,
            }
            if node.terminal {
                return true;
            }
        }

        false
    }

    /// Number of networks inserted, duplicates included
    pub fn len(&self) -> usize {
        self.networks
    }

    pub fn is_empty(&self) -> bool {
        self.networks == 0
    }
}

impl Extend<IpNet> for NetworkTrie {
    fn extend<I: IntoIterator<Item = IpNet>>(&mut self, iter: I) {
        for network in iter {
            self.insert(network);
        }
    }
}

impl FromIterator<IpNet> for NetworkTrie {
    fn from_iter<I: IntoIterator<Item = IpNet>>(iter: I) -> Self {
        let mut trie = Self::new();
        trie.extend(iter);
        trie
    }
}

/// Address bits packed into the high end of a u128, plus the family's width
fn left_aligned(addr: IpAddr) -> (u128, u32) {
    match addr {
        IpAddr::V4(addr) => (u128::from(u32::from(addr)) << 96, 32),
        IpAddr::V6(addr) => (u128::from(addr), 128),
    }
}

/// Most significant bit first
fn bit_at(bits: u128, index: u32) -> bool {
    (bits >> (127 - index)) & 1 == 1
}
