// src/peer/mod.rs
//! Per-peer state containers for the timeout policies.

use std::collections::HashMap;
use std::net::SocketAddr;

/// Storage for per-peer timeout state, keyed by remote address.
pub trait PeerContainer<S>: Default {
    /// Returns the state record for `addr`, creating it on first access.
    fn get_or_default(&mut self, addr: SocketAddr) -> &mut S;
}

/// A single record shared by every peer.
///
/// Used with policies that keep no per-peer data, such as the constant
/// timeout policy.
#[derive(Debug, Default)]
pub struct SharedPeer<S> {
    shared: S,
}

impl<S: Default> PeerContainer<S> for SharedPeer<S> {
    fn get_or_default(&mut self, _addr: SocketAddr) -> &mut S {
        &mut self.shared
    }
}

/// An address-keyed map of peer records, defaulted on first access.
#[derive(Debug)]
pub struct PeerMap<S> {
    peers: HashMap<SocketAddr, S>,
}

impl<S> Default for PeerMap<S> {
    fn default() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }
}

impl<S: Default> PeerContainer<S> for PeerMap<S> {
    fn get_or_default(&mut self, addr: SocketAddr) -> &mut S {
        self.peers.entry(addr).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn shared_container_returns_one_record_for_all_peers() {
        let mut peers: SharedPeer<u32> = SharedPeer::default();
        *peers.get_or_default(addr("111.111.111.111:80")) = 7;
        assert_eq!(*peers.get_or_default(addr("222.222.222.222:80")), 7);
    }

    #[test]
    fn map_container_keys_by_address() {
        let mut peers: PeerMap<u32> = PeerMap::default();
        *peers.get_or_default(addr("111.111.111.111:80")) = 7;

        assert_eq!(*peers.get_or_default(addr("222.222.222.222:80")), 0);
        assert_eq!(*peers.get_or_default(addr("111.111.111.111:80")), 7);
    }
}
