//! The request proxy.
//!
//! Forwards request-class messages to a peer picked by the selector, tracks
//! the pending request by its wire `request_id`, and shuttles the paired
//! response back to the original requester. Requests that never get a
//! response are retired by the deadline, with a background sweeper
//! guaranteeing eventual cleanup of orphaned entries.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use tokio::{
    sync::oneshot,
    time::{timeout, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use ethrelay_p2p_core::{NodeId, Peer, RelayError};
use ethrelay_wire::{Envelope, MessageId};

use crate::{
    constants::{PENDING_SWEEP_INTERVAL, REQUEST_TIMEOUT},
    peer_set::PeerSet,
};

/// Picks the peer a request is forwarded to.
///
/// Implementations keep whatever cursor state they need across calls; the
/// proxy serializes access.
pub trait PeerSelector: Send {
    /// Picks a target from `peers`, never returning `exclude`.
    fn select(&mut self, peers: &[Arc<Peer>], exclude: &NodeId) -> Option<NodeId>;
}

/// Round-robin over the peer-set snapshot, skipping the requester. The
/// cursor persists across calls so load spreads evenly.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeerSelector for RoundRobin {
    fn select(&mut self, peers: &[Arc<Peer>], exclude: &NodeId) -> Option<NodeId> {
        if peers.is_empty() {
            return None;
        }

        for _ in 0..peers.len() {
            let peer = &peers[self.cursor % peers.len()];
            self.cursor = self.cursor.wrapping_add(1);
            if peer.id() != *exclude {
                return Some(peer.id());
            }
        }
        None
    }
}

/// A request forwarded to a peer, awaiting its response.
struct PendingRequest {
    /// The original requester.
    from: NodeId,
    /// The peer the request was forwarded to; only it may answer.
    to: NodeId,
    /// Response delivery; the buffer of one keeps delivery non-blocking.
    tx: oneshot::Sender<Bytes>,
    deadline: Instant,
}

/// The request proxy.
pub struct RequestProxy {
    peer_set: Arc<PeerSet>,
    pending: Mutex<HashMap<u64, PendingRequest>>,
    selector: Mutex<Box<dyn PeerSelector>>,
    quit: CancellationToken,
}

impl RequestProxy {
    pub fn new(
        peer_set: Arc<PeerSet>,
        selector: Box<dyn PeerSelector>,
        quit: CancellationToken,
    ) -> Self {
        Self {
            peer_set,
            pending: Mutex::new(HashMap::new()),
            selector: Mutex::new(selector),
            quit,
        }
    }

    /// The number of requests currently in flight.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Forwards a request from `from` to a selected peer and delivers the
    /// response (with the paired response code and the same `request_id`)
    /// back to the requester.
    pub async fn forward(
        &self,
        from: NodeId,
        id: MessageId,
        request_id: u64,
        payload: Bytes,
    ) -> Result<(), RelayError> {
        let response_id = id
            .response_for()
            .expect("the engine only forwards request-class messages");

        let peers = self.peer_set.all();
        let target_id = self
            .selector
            .lock()
            .unwrap()
            .select(&peers, &from)
            .ok_or(RelayError::NoTargetPeer)?;
        let target = self
            .peer_set
            .get(&target_id)
            .ok_or(RelayError::PeerDisconnected)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap();
            let entry = PendingRequest {
                from,
                to: target_id,
                tx,
                deadline: Instant::now() + REQUEST_TIMEOUT,
            };
            if pending.insert(request_id, entry).is_some() {
                tracing::debug!("request id {request_id:#x} reused while in flight, superseding");
            }
        }

        if let Err(e) = target.send(Envelope::new(id, payload)).await {
            self.remove_pending(request_id);
            return Err(e);
        }

        // The sweeper may also retire the entry, which closes the channel;
        // both outcomes count as a timeout.
        let response = match timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            // A closed channel means the sweeper retired the entry.
            Ok(Err(_)) | Err(_) => {
                self.remove_pending(request_id);
                return Err(RelayError::RequestTimeout);
            }
        };

        let requester = self
            .peer_set
            .get(&from)
            .ok_or(RelayError::PeerDisconnected)?;
        requester.send(Envelope::new(response_id, response)).await
    }

    /// Hands a response from peer `from` to the task awaiting it.
    ///
    /// Responses with no matching entry are dropped; responses from a peer
    /// other than the forward target are dropped without touching the entry,
    /// so the real target can still answer.
    pub fn deliver_response(
        &self,
        from: NodeId,
        request_id: u64,
        payload: Bytes,
    ) -> Result<(), RelayError> {
        let entry = {
            let mut pending = self.pending.lock().unwrap();
            let Some(entry) = pending.get(&request_id) else {
                return Err(RelayError::UnknownRequest(request_id));
            };
            if entry.to != from {
                let expected = entry.to;
                return Err(RelayError::UnexpectedResponsePeer {
                    request_id,
                    expected,
                    got: from,
                });
            }
            pending
                .remove(&request_id)
                .expect("entry observed under the same lock")
        };

        // Delivery happens outside the table lock and cannot block.
        let _ = entry.tx.send(payload);
        Ok(())
    }

    fn remove_pending(&self, request_id: u64) {
        self.pending.lock().unwrap().remove(&request_id);
    }

    /// Sweeps expired entries every [`PENDING_SWEEP_INTERVAL`], dropping
    /// their channels. This is the only guaranteed cleanup for requests
    /// whose forwarder task is gone.
    pub async fn run_sweeper(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(PENDING_SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.quit.cancelled() => break,
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let mut pending = self.pending.lock().unwrap();
                    pending.retain(|request_id, entry| {
                        let keep = entry.deadline > now;
                        if !keep {
                            tracing::trace!(
                                "sweeping expired request {request_id:#x} from {}",
                                entry.from
                            );
                        }
                        keep
                    });
                }
            }
        }
    }
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

    use super::{PeerSelector, RequestProxy, RoundRobin};
    use crate::peer_set::PeerSet;

    struct TestPeer {
        id: NodeId,
        rx: mpsc::Receiver<Envelope>,
        _guard: ConnectionGuard,
    }

    fn attach_peer(set: &PeerSet, id: u8) -> TestPeer {
        let (tx, rx) = mpsc::channel(8);
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

    fn proxy(set: &Arc<PeerSet>) -> Arc<RequestProxy> {
        Arc::new(RequestProxy::new(
            Arc::clone(set),
            Box::new(RoundRobin::new()),
            CancellationToken::new(),
        ))
    }

    #[tokio::test]
    async fn round_robin_skips_requester_and_distributes() {
        let set = Arc::new(PeerSet::new());
        let a = attach_peer(&set, 1);
        let b = attach_peer(&set, 2);
        let c = attach_peer(&set, 3);
        let d = attach_peer(&set, 4);

        let mut selector = RoundRobin::new();
        let peers = set.all();

        let picks: Vec<NodeId> = (0..4)
            .map(|_| selector.select(&peers, &a.id).unwrap())
            .collect();
        assert_eq!(picks, vec![b.id, c.id, d.id, b.id]);
    }

    #[tokio::test]
    async fn selector_with_no_eligible_peer_returns_none() {
        let set = Arc::new(PeerSet::new());
        let a = attach_peer(&set, 1);

        let mut selector = RoundRobin::new();
        assert!(selector.select(&set.all(), &a.id).is_none());
        assert!(selector.select(&[], &a.id).is_none());
    }

    #[tokio::test]
    async fn happy_path_roundtrip() {
        let set = Arc::new(PeerSet::new());
        let mut a = attach_peer(&set, 1);
        let mut b = attach_peer(&set, 2);
        let proxy = proxy(&set);

        let forward = {
            let proxy = Arc::clone(&proxy);
            let from = a.id;
            tokio::spawn(async move {
                proxy
                    .forward(
                        from,
                        MessageId::GetBlockHeaders,
                        0xabcd,
                        Bytes::from_static(b"query"),
                    )
                    .await
            })
        };

        // B receives the forwarded request verbatim.
        let req = b.rx.recv().await.unwrap();
        assert_eq!(req.id, MessageId::GetBlockHeaders);
        assert_eq!(req.payload.as_ref(), b"query");

        // B answers; A gets the paired response code.
        proxy
            .deliver_response(b.id, 0xabcd, Bytes::from_static(b"headers"))
            .unwrap();
        forward.await.unwrap().unwrap();

        let resp = a.rx.recv().await.unwrap();
        assert_eq!(resp.id, MessageId::BlockHeaders);
        assert_eq!(resp.payload.as_ref(), b"headers");
        assert_eq!(proxy.pending_len(), 0);
    }

    #[tokio::test]
    async fn no_target_peer_without_an_eligible_peer() {
        let set = Arc::new(PeerSet::new());
        let a = attach_peer(&set, 1);
        let proxy = proxy(&set);

        let err = proxy
            .forward(a.id, MessageId::GetReceipts, 1, Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NoTargetPeer));
        assert_eq!(proxy.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_retires_the_entry_and_frees_the_id() {
        let set = Arc::new(PeerSet::new());
        let a = attach_peer(&set, 1);
        let mut b = attach_peer(&set, 2);
        let proxy = proxy(&set);

        let forward = {
            let proxy = Arc::clone(&proxy);
            let from = a.id;
            tokio::spawn(async move {
                proxy
                    .forward(from, MessageId::GetBlockHeaders, 42, Bytes::new())
                    .await
            })
        };

        // The request reaches B, which never answers.
        let _ = b.rx.recv().await.unwrap();
        let err = forward.await.unwrap().unwrap_err();
        assert!(matches!(err, RelayError::RequestTimeout));
        assert_eq!(proxy.pending_len(), 0);

        // The id is immediately reusable.
        let forward = {
            let proxy = Arc::clone(&proxy);
            let from = a.id;
            tokio::spawn(async move {
                proxy
                    .forward(from, MessageId::GetBlockHeaders, 42, Bytes::new())
                    .await
            })
        };
        let _ = b.rx.recv().await.unwrap();
        proxy.deliver_response(b.id, 42, Bytes::new()).unwrap();
        forward.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_request_id_is_dropped() {
        let set = Arc::new(PeerSet::new());
        let b = attach_peer(&set, 2);
        let proxy = proxy(&set);

        assert!(matches!(
            proxy.deliver_response(b.id, 999, Bytes::new()),
            Err(RelayError::UnknownRequest(999))
        ));
    }

    #[tokio::test]
    async fn response_from_the_wrong_peer_is_dropped_entry_retained() {
        let set = Arc::new(PeerSet::new());
        let mut a = attach_peer(&set, 1);
        let mut b = attach_peer(&set, 2);
        let c = attach_peer(&set, 3);
        let proxy = proxy(&set);

        let forward = {
            let proxy = Arc::clone(&proxy);
            let from = a.id;
            tokio::spawn(async move {
                proxy
                    .forward(from, MessageId::GetBlockBodies, 7, Bytes::new())
                    .await
            })
        };
        let _ = b.rx.recv().await.unwrap();

        // C tries to answer a request that was routed to B.
        let err = proxy
            .deliver_response(c.id, 7, Bytes::from_static(b"forged"))
            .unwrap_err();
        assert!(matches!(err, RelayError::UnexpectedResponsePeer { .. }));
        assert_eq!(proxy.pending_len(), 1);

        // B can still answer.
        proxy
            .deliver_response(b.id, 7, Bytes::from_static(b"real"))
            .unwrap();
        forward.await.unwrap().unwrap();
        assert_eq!(a.rx.recv().await.unwrap().payload.as_ref(), b"real");
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_retires_expired_entries() {
        let set = Arc::new(PeerSet::new());
        let a = attach_peer(&set, 1);
        let b = attach_peer(&set, 2);
        let proxy = proxy(&set);
        let sweeper = tokio::spawn(Arc::clone(&proxy).run_sweeper());

        // Plant an orphaned pending entry directly, as if its forwarder
        // task had died.
        {
            let (tx, _rx) = tokio::sync::oneshot::channel();
            proxy.pending.lock().unwrap().insert(
                5,
                super::PendingRequest {
                    from: a.id,
                    to: b.id,
                    tx,
                    deadline: tokio::time::Instant::now()
                        + crate::constants::REQUEST_TIMEOUT,
                },
            );
        }

        // Within one sweep past the deadline the entry is gone.
        tokio::time::sleep(
            crate::constants::REQUEST_TIMEOUT + 2 * crate::constants::PENDING_SWEEP_INTERVAL,
        )
        .await;
        assert_eq!(proxy.pending_len(), 0);

        sweeper.abort();
    }

    /// A selector that always picks the requester would break the exclusion
    /// contract; the trait object seam keeps strategies swappable.
    #[tokio::test]
    async fn custom_selector_is_honored() {
        struct Fixed(NodeId);
        impl PeerSelector for Fixed {
            fn select(
                &mut self,
                _: &[Arc<Peer>],
                _: &NodeId,
            ) -> Option<NodeId> {
                Some(self.0)
            }
        }

        let set = Arc::new(PeerSet::new());
        let a = attach_peer(&set, 1);
        let mut b = attach_peer(&set, 2);
        let _c = attach_peer(&set, 3);

        let proxy = Arc::new(RequestProxy::new(
            Arc::clone(&set),
            Box::new(Fixed(b.id)),
            CancellationToken::new(),
        ));

        let forward = {
            let proxy = Arc::clone(&proxy);
            let from = a.id;
            tokio::spawn(async move {
                proxy
                    .forward(from, MessageId::GetPooledTransactions, 3, Bytes::new())
                    .await
            })
        };

        assert_eq!(
            b.rx.recv().await.unwrap().id,
            MessageId::GetPooledTransactions
        );
        proxy.deliver_response(b.id, 3, Bytes::new()).unwrap();
        forward.await.unwrap().unwrap();
    }
}
