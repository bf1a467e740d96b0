//! An attached peer.

use std::time::Instant;

use tokio::{sync::mpsc, time::timeout};

use ethrelay_wire::Envelope;

use crate::{
    constants::SENDING_TIMEOUT, error::RelayError, handles::ConnectionHandle, identity::NodeId,
    ConnectionDirection,
};

/// A live duplex channel to one remote node.
///
/// The peer set is the sole owner; everything else refers to peers by
/// [`NodeId`] and re-resolves through the set.
#[derive(Debug)]
pub struct Peer {
    id: NodeId,
    direction: ConnectionDirection,
    /// The negotiated eth protocol version.
    version: u32,
    attached_at: Instant,
    /// Outbound frames; drained by the peer's writer task.
    outbound: mpsc::Sender<Envelope>,
    handle: ConnectionHandle,
}

impl Peer {
    pub fn new(
        id: NodeId,
        direction: ConnectionDirection,
        version: u32,
        outbound: mpsc::Sender<Envelope>,
        handle: ConnectionHandle,
    ) -> Self {
        Self {
            id,
            direction,
            version,
            attached_at: Instant::now(),
            outbound,
            handle,
        }
    }

    pub const fn id(&self) -> NodeId {
        self.id
    }

    pub const fn direction(&self) -> ConnectionDirection {
        self.direction
    }

    pub const fn version(&self) -> u32 {
        self.version
    }

    pub const fn attached_at(&self) -> Instant {
        self.attached_at
    }

    pub const fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Queues a frame to this peer's writer.
    ///
    /// Blocks while the writer's queue is full; a closed channel means the
    /// peer is gone.
    pub async fn send(&self, envelope: Envelope) -> Result<(), RelayError> {
        if self.handle.is_closed() {
            return Err(RelayError::PeerDisconnected);
        }

        timeout(SENDING_TIMEOUT, self.outbound.send(envelope))
            .await
            .map_err(|_| RelayError::SendTimeout)?
            .map_err(|_| RelayError::PeerDisconnected)
    }
}
