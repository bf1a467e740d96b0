//! Ethrelay's P2P crate.
//!
//! The relay core: a stateless message router for the eth wire protocol.
//! Inbound gossip fans out to all other peers through per-source ordered
//! queues; request/response pairs are proxied to a peer picked round-robin,
//! tracked by `request_id` with a hard deadline. No chain state is held
//! anywhere; the peer set and the pending-request table are the only
//! mutable state and both die with the process.

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use ethrelay_p2p_core::{connection_handles, ConnectionDirection, NodeId, Peer};
use ethrelay_wire::{Envelope, WireError};

mod connection;
pub mod connector;
pub mod constants;
pub mod discovery;
pub mod engine;
pub mod handshake;
pub mod peer_set;
pub mod proxy;
pub mod router;
pub mod scheduler;
pub mod static_nodes;

pub use connector::{ConnectError, ConnectRequest, Connector};
pub use engine::{InboundMessage, RelayEngine};
pub use peer_set::PeerSet;
pub use proxy::{PeerSelector, RequestProxy, RoundRobin};
pub use router::MessageRouter;
pub use scheduler::DialScheduler;

use crate::constants::{INBOUND_QUEUE_CAPACITY, PEER_WRITE_QUEUE_CAPACITY};

/// The attachment surface the session layer drives.
///
/// Cloneable and cheap; every clone shares the same peer set, proxy and
/// inbound queue.
#[derive(Clone)]
pub struct Relay {
    peer_set: Arc<PeerSet>,
    proxy: Arc<RequestProxy>,
    inbound_tx: mpsc::Sender<InboundMessage>,
}

impl Relay {
    pub fn peer_set(&self) -> &Arc<PeerSet> {
        &self.peer_set
    }

    pub fn peer_count(&self) -> usize {
        self.peer_set.len()
    }

    /// The number of proxied requests currently awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.proxy.pending_len()
    }

    /// Registers a handshaken peer and spawns its I/O tasks.
    ///
    /// Returns `false` if a peer with this id is already attached; the
    /// existing peer is retained and the new connection is dropped.
    pub fn attach_peer<Str, Snk>(
        &self,
        id: NodeId,
        direction: ConnectionDirection,
        version: u32,
        stream: Str,
        sink: Snk,
    ) -> bool
    where
        Str: futures::Stream<Item = Result<Envelope, WireError>> + Unpin + Send + 'static,
        Snk: futures::Sink<Envelope, Error = WireError> + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel(PEER_WRITE_QUEUE_CAPACITY);
        let (guard, handle) = connection_handles();

        let peer = Arc::new(Peer::new(id, direction, version, outbound_tx, handle.clone()));
        if !self.peer_set.add(peer) {
            return false;
        }

        connection::spawn_peer_io(
            Arc::clone(&self.peer_set),
            self.inbound_tx.clone(),
            id,
            stream,
            sink,
            outbound_rx,
            guard,
            handle,
        );
        true
    }
}

/// The running engine; stop it to tear the relay down.
pub struct RelayTask {
    quit: CancellationToken,
    engine: JoinHandle<()>,
}

impl RelayTask {
    /// Signals quit and joins the engine, which in turn stops the proxy
    /// sweeper and every router worker before returning.
    pub async fn stop(self) {
        self.quit.cancel();
        let _ = self.engine.await;
    }
}

/// Assembles the relay and launches the engine loop.
///
/// The quit token returned inside [`RelayTask`] is the root cancellation
/// signal for the engine, the router workers and the proxy sweeper.
pub fn initialize_relay(selector: Box<dyn PeerSelector>) -> (Relay, RelayTask) {
    let quit = CancellationToken::new();
    let peer_set = Arc::new(PeerSet::new());
    let router = Arc::new(MessageRouter::new(Arc::clone(&peer_set), quit.clone()));
    let proxy = Arc::new(RequestProxy::new(
        Arc::clone(&peer_set),
        selector,
        quit.clone(),
    ));

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
    let engine = RelayEngine::new(inbound_rx, router, Arc::clone(&proxy), quit.clone());
    let engine = tokio::spawn(engine.run());

    (
        Relay {
            peer_set,
            proxy,
            inbound_tx,
        },
        RelayTask { quit, engine },
    )
}
