//! The message router.
//!
//! Fans gossip out to every peer except its source while preserving, per
//! source, the order in which messages were read off the wire. Each source
//! peer gets a lazily-created bounded queue with exactly one drain worker;
//! the worker is the sole producer of outbound writes for messages
//! originating from that source.
//!
//! No ordering is guaranteed across sources or across destinations.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use ethrelay_p2p_core::{NodeId, RelayError};
use ethrelay_wire::{Envelope, MessageId};

use crate::{constants::ORDERED_QUEUE_CAPACITY, peer_set::PeerSet};

/// One queued outbound forward.
struct QueuedMessage {
    id: MessageId,
    payload: Bytes,
    target: NodeId,
}

/// A per-source ordered queue and its single drain worker.
struct SourceQueue {
    tx: mpsc::Sender<QueuedMessage>,
    worker: JoinHandle<()>,
}

/// Broadcast router with per-source ordering.
pub struct MessageRouter {
    peer_set: Arc<PeerSet>,
    queues: RwLock<HashMap<NodeId, SourceQueue>>,
    quit: CancellationToken,
}

impl MessageRouter {
    pub fn new(peer_set: Arc<PeerSet>, quit: CancellationToken) -> Self {
        Self {
            peer_set,
            queues: RwLock::new(HashMap::new()),
            quit,
        }
    }

    /// Enqueues `payload` for every attached peer other than `source`.
    ///
    /// An empty fan-out is a successful no-op. When the source's queue is
    /// full this blocks until space frees up, or returns
    /// [`RelayError::PeerDisconnected`] if the router shuts down first.
    pub async fn broadcast(
        &self,
        source: NodeId,
        id: MessageId,
        payload: Bytes,
    ) -> Result<(), RelayError> {
        let peers = self.peer_set.all();
        if peers.iter().all(|peer| peer.id() == source) {
            return Ok(());
        }

        let queue = self.queue_for(source);
        for peer in peers {
            if peer.id() == source {
                continue;
            }

            let item = QueuedMessage {
                id,
                payload: payload.clone(),
                target: peer.id(),
            };
            tokio::select! {
                res = queue.send(item) => {
                    if res.is_err() {
                        return Err(RelayError::PeerDisconnected);
                    }
                }
                () = self.quit.cancelled() => return Err(RelayError::PeerDisconnected),
            }
        }

        Ok(())
    }

    /// The sender for a source's queue, creating queue and worker on first
    /// use.
    fn queue_for(&self, source: NodeId) -> mpsc::Sender<QueuedMessage> {
        if let Some(queue) = self.queues.read().unwrap().get(&source) {
            return queue.tx.clone();
        }

        let mut queues = self.queues.write().unwrap();
        queues
            .entry(source)
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(ORDERED_QUEUE_CAPACITY);
                let worker = tokio::spawn(run_worker(
                    source,
                    Arc::clone(&self.peer_set),
                    rx,
                    self.quit.clone(),
                ));
                SourceQueue { tx, worker }
            })
            .tx
            .clone()
    }

    /// Signals every worker to quit and joins them. Items still queued are
    /// discarded.
    pub async fn shutdown(&self) {
        self.quit.cancel();

        let queues = std::mem::take(&mut *self.queues.write().unwrap());
        for (source, queue) in queues {
            drop(queue.tx);
            if queue.worker.await.is_err() {
                tracing::debug!("router worker for source {source} panicked");
            }
        }
    }
}

/// Drains one source's queue in FIFO order.
///
/// Destinations are re-resolved through the peer set on every send, so the
/// worker never holds a peer alive. Send failures are logged and skipped;
/// the worker only stops on shutdown.
async fn run_worker(
    source: NodeId,
    peer_set: Arc<PeerSet>,
    mut rx: mpsc::Receiver<QueuedMessage>,
    quit: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            () = quit.cancelled() => break,
            item = rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        let Some(peer) = peer_set.get(&item.target) else {
            tracing::trace!("broadcast target {} already detached", item.target);
            continue;
        };

        if let Err(e) = peer.send(Envelope::new(item.id, item.payload)).await {
            tracing::debug!(
                "failed to forward {} from {source} to {}: {e}",
                item.id,
                item.target
            );
        }
    }

    tracing::trace!("router worker for source {source} stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use ethrelay_p2p_core::{
        connection_handles, ConnectionDirection, ConnectionGuard, NodeId, Peer, RelayError,
    };
    use ethrelay_wire::{Envelope, MessageId};

    use super::MessageRouter;
    use crate::peer_set::PeerSet;

    struct TestPeer {
        id: NodeId,
        rx: mpsc::Receiver<Envelope>,
        _guard: ConnectionGuard,
    }

    fn attach_peer(set: &PeerSet, id: u8, capacity: usize) -> TestPeer {
        let (tx, rx) = mpsc::channel(capacity);
        let (guard, handle) = connection_handles();
        let id = NodeId::new([id; 32]);
        set.add(Arc::new(Peer::new(
            id,
            ConnectionDirection::Outbound,
            69,
            tx,
            handle,
        )));
        TestPeer {
            id,
            rx,
            _guard: guard,
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone_but_the_source() {
        let set = Arc::new(PeerSet::new());
        let mut a = attach_peer(&set, 1, 8);
        let mut b = attach_peer(&set, 2, 8);
        let mut c = attach_peer(&set, 3, 8);

        let router = MessageRouter::new(Arc::clone(&set), CancellationToken::new());
        let payload = Bytes::from_static(b"tx payload");
        router
            .broadcast(a.id, MessageId::Transactions, payload.clone())
            .await
            .unwrap();

        for peer in [&mut b, &mut c] {
            let env = peer.rx.recv().await.unwrap();
            assert_eq!(env.id, MessageId::Transactions);
            assert_eq!(env.payload, payload);
        }
        assert!(a.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn per_source_order_is_preserved() {
        let set = Arc::new(PeerSet::new());
        let a = attach_peer(&set, 1, 64);
        let mut b = attach_peer(&set, 2, 64);

        let router = MessageRouter::new(Arc::clone(&set), CancellationToken::new());
        for i in 0..32_u8 {
            router
                .broadcast(a.id, MessageId::Transactions, Bytes::from(vec![i]))
                .await
                .unwrap();
        }

        for i in 0..32_u8 {
            let env = b.rx.recv().await.unwrap();
            assert_eq!(env.payload.as_ref(), &[i]);
        }
    }

    #[tokio::test]
    async fn empty_set_broadcast_is_a_successful_noop() {
        let set = Arc::new(PeerSet::new());
        let router = MessageRouter::new(Arc::clone(&set), CancellationToken::new());

        router
            .broadcast(NodeId::new([1; 32]), MessageId::NewBlock, Bytes::new())
            .await
            .unwrap();

        // No queue was even created for the source.
        assert!(router.queues.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_peer_broadcast_by_that_peer_fans_out_nothing() {
        let set = Arc::new(PeerSet::new());
        let a = attach_peer(&set, 1, 8);

        let router = MessageRouter::new(Arc::clone(&set), CancellationToken::new());
        router
            .broadcast(a.id, MessageId::Transactions, Bytes::new())
            .await
            .unwrap();
        assert!(router.queues.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_queue_blocks_until_quit_unblocks_with_error() {
        let set = Arc::new(PeerSet::new());
        let a = attach_peer(&set, 1, 1);
        // Writer queue of 1 and no reader: the worker jams on the first
        // send, the ordered queue then fills up.
        let b = attach_peer(&set, 2, 1);

        let quit = CancellationToken::new();
        let router = Arc::new(MessageRouter::new(Arc::clone(&set), quit.clone()));

        let flooder = {
            let router = Arc::clone(&router);
            let source = a.id;
            tokio::spawn(async move {
                loop {
                    if let Err(e) = router
                        .broadcast(source, MessageId::Transactions, Bytes::new())
                        .await
                    {
                        return e;
                    }
                }
            })
        };

        // Give the flooder time to wedge on the full queue, then shut down.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        quit.cancel();

        let err = flooder.await.unwrap();
        assert!(matches!(err, RelayError::PeerDisconnected));
        drop(b);
    }

    #[tokio::test]
    async fn worker_survives_a_detached_destination() {
        let set = Arc::new(PeerSet::new());
        let a = attach_peer(&set, 1, 8);
        let b = attach_peer(&set, 2, 8);
        let mut c = attach_peer(&set, 3, 8);

        let router = MessageRouter::new(Arc::clone(&set), CancellationToken::new());

        // Detach b after the snapshot, before the worker drains.
        let payload = Bytes::from_static(b"after detach");
        set.remove(&b.id);
        router
            .broadcast(a.id, MessageId::NewBlock, payload.clone())
            .await
            .unwrap();

        let env = c.rx.recv().await.unwrap();
        assert_eq!(env.payload, payload);
    }

    #[tokio::test]
    async fn shutdown_joins_workers() {
        let set = Arc::new(PeerSet::new());
        let a = attach_peer(&set, 1, 8);
        let _b = attach_peer(&set, 2, 8);

        let router = MessageRouter::new(Arc::clone(&set), CancellationToken::new());
        router
            .broadcast(a.id, MessageId::Transactions, Bytes::new())
            .await
            .unwrap();

        router.shutdown().await;
        assert!(router.queues.read().unwrap().is_empty());
    }
}
