//! Discovery filtering and mixing.
//!
//! The discovery stack itself (discv4/discv5 walks, DNS lists) lives in the
//! lower library; it reaches the relay as plain streams of node records.
//! This module constrains those candidates to the intended network with the
//! fork-id filter and mixes the sources fairly.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{future::ready, stream::BoxStream, Stream, StreamExt};
use tokio_stream::StreamMap;

use ethrelay_p2p_core::NodeRecord;
use ethrelay_wire::ForkId;

use crate::constants::{DISCOVERY_PREFETCH, ENR_RESOLVE_CONCURRENCY};

/// A stream of discovered candidate records.
pub type NodeStream = BoxStream<'static, NodeRecord>;

/// Fork-id compatibility: equal hashes, an unscheduled `next` on either
/// side, or a candidate that is already ahead on fork transitions.
pub fn fork_compatible(ours: ForkId, theirs: ForkId) -> bool {
    theirs.hash == ours.hash || theirs.next == 0 || ours.next == 0 || theirs.next >= ours.next
}

/// The node filter applied to every eth discovery source: the record must
/// carry an `eth` entry whose fork id passes [`fork_compatible`].
///
/// A pure predicate, cheap enough to call per candidate.
pub fn eth_node_filter(ours: ForkId) -> impl Fn(&NodeRecord) -> bool + Clone + Send + 'static {
    move |record| {
        record
            .fork_id()
            .is_some_and(|theirs| fork_compatible(ours, theirs))
    }
}

/// A fair mix of named discovery sources.
///
/// Sources wrapped with a filter only surface passing candidates; the snap
/// DNS list joins unfiltered.
#[derive(Default)]
pub struct DiscoveryMix {
    sources: StreamMap<&'static str, NodeStream>,
}

impl DiscoveryMix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source gated by `filter`.
    pub fn add_filtered(
        &mut self,
        name: &'static str,
        source: NodeStream,
        filter: impl Fn(&NodeRecord) -> bool + Send + 'static,
    ) {
        self.sources
            .insert(name, source.filter(move |record| ready(filter(record))).boxed());
    }

    /// Adds a source as-is.
    pub fn add_unfiltered(&mut self, name: &'static str, source: NodeStream) {
        self.sources.insert(name, source);
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Stream for DiscoveryMix {
    type Item = NodeRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.sources
            .poll_next_unpin(cx)
            .map(|item| item.map(|(_, record)| record))
    }
}

/// Wraps a random-walk source with asynchronous record resolution, keeping
/// up to [`ENR_RESOLVE_CONCURRENCY`] lookups in flight. Candidates whose
/// resolution fails are dropped.
pub fn resolve_records<F, Fut>(candidates: NodeStream, resolve: F) -> NodeStream
where
    F: FnMut(NodeRecord) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Option<NodeRecord>> + Send + 'static,
{
    candidates
        .map(resolve)
        .buffer_unordered(ENR_RESOLVE_CONCURRENCY)
        .filter_map(ready)
        .boxed()
}

/// Decouples a source from its consumer with a small prefetch buffer, so a
/// slow dial loop does not stall the walk.
pub fn prefetch(source: NodeStream) -> NodeStream {
    let (tx, rx) = tokio::sync::mpsc::channel(DISCOVERY_PREFETCH);
    tokio::spawn(async move {
        let mut source = source;
        while let Some(record) = source.next().await {
            if tx.send(record).await.is_err() {
                break;
            }
        }
    });
    tokio_stream::wrappers::ReceiverStream::new(rx).boxed()
}

#[cfg(test)]
mod tests {
    use futures::{stream, StreamExt};

    use ethrelay_p2p_core::{NodeIdentity, NodeRecord};
    use ethrelay_wire::{Chain, ForkHash, ForkId};

    use super::{eth_node_filter, fork_compatible, resolve_records, DiscoveryMix};

    fn record_with_fork_id(fork_id: Option<ForkId>) -> NodeRecord {
        let identity = NodeIdentity::generate();
        let mut record = NodeRecord::new(&identity);
        if let Some(fork_id) = fork_id {
            record.set_fork_id(fork_id, &identity);
        }
        record
    }

    #[test]
    fn filter_requires_an_eth_entry() {
        let filter = eth_node_filter(Chain::Mainnet.fork_id());

        assert!(!filter(&record_with_fork_id(None)));
        assert!(filter(&record_with_fork_id(Some(Chain::Mainnet.fork_id()))));
    }

    #[test]
    fn compatibility_tolerates_peers_slightly_ahead() {
        let ours = ForkId::new(ForkHash([1, 2, 3, 4]), 100);

        // Same hash.
        assert!(fork_compatible(ours, ForkId::new(ForkHash([1, 2, 3, 4]), 0)));
        // Unscheduled next on the candidate side.
        assert!(fork_compatible(ours, ForkId::new(ForkHash([9, 9, 9, 9]), 0)));
        // Candidate ahead of our next fork.
        assert!(fork_compatible(ours, ForkId::new(ForkHash([9, 9, 9, 9]), 100)));
        assert!(fork_compatible(ours, ForkId::new(ForkHash([9, 9, 9, 9]), 150)));
        // Behind us on a different chain: incompatible.
        assert!(!fork_compatible(ours, ForkId::new(ForkHash([9, 9, 9, 9]), 50)));
    }

    #[tokio::test]
    async fn mix_filters_eth_sources_and_passes_snap_through() {
        let ours = ForkId::new(ForkHash([1, 2, 3, 4]), 100);
        let good = record_with_fork_id(Some(ours));
        // A foreign chain that is also behind on forks: never passes.
        let bad = record_with_fork_id(Some(ForkId::new(ForkHash([0xff; 4]), 50)));
        let snap = record_with_fork_id(None);

        let mut mix = DiscoveryMix::new();
        mix.add_filtered(
            "discv4",
            stream::iter(vec![good.clone(), bad]).boxed(),
            eth_node_filter(ours),
        );
        mix.add_unfiltered("dns-snap", stream::iter(vec![snap.clone()]).boxed());

        let surfaced: Vec<NodeRecord> = mix.collect().await;
        assert_eq!(surfaced.len(), 2);
        assert!(surfaced.contains(&good));
        assert!(surfaced.contains(&snap));
    }

    #[tokio::test]
    async fn resolution_drops_failed_lookups() {
        let a = record_with_fork_id(None);
        let b = record_with_fork_id(None);
        let keep = a.node_id().unwrap();

        let resolved: Vec<NodeRecord> = resolve_records(
            stream::iter(vec![a, b]).boxed(),
            move |record| {
                let keep = keep;
                async move { (record.node_id().unwrap() == keep).then_some(record) }
            },
        )
        .collect()
        .await;

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].node_id().unwrap(), keep);
    }
}
