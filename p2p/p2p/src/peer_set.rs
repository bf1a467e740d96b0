//! The peer set.
//!
//! Sole owner of all attached peers, keyed by node id. Insertion order is
//! preserved, which gives broadcast snapshots and the round-robin selector
//! a stable iteration order.

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use ethrelay_p2p_core::{NodeId, Peer};

/// Mapping `NodeId → Peer` with add-if-absent semantics.
///
/// Many readers, occasional writers; readers only ever observe complete
/// snapshots.
#[derive(Debug, Default)]
pub struct PeerSet {
    peers: RwLock<IndexMap<NodeId, Arc<Peer>>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer, returning `false` (and retaining the existing peer) if
    /// one with the same id is already attached.
    pub fn add(&self, peer: Arc<Peer>) -> bool {
        let mut peers = self.peers.write().unwrap();
        match peers.entry(peer.id()) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(peer);
                true
            }
        }
    }

    /// Removes and disconnects a peer. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &NodeId) {
        let removed = self.peers.write().unwrap().shift_remove(id);
        if let Some(peer) = removed {
            peer.handle().disconnect();
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<Arc<Peer>> {
        self.peers.read().unwrap().get(id).cloned()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.peers.read().unwrap().contains_key(id)
    }

    /// A consistent point-in-time snapshot, in attachment order. Callers
    /// iterate without holding the set's lock.
    pub fn all(&self) -> Vec<Arc<Peer>> {
        self.peers.read().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
