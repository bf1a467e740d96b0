//! The outbound connector.
//!
//! A [`tower::Service`] that takes a candidate record through the full
//! attachment pipeline: transport dial, Status exchange, registration in
//! the peer set, I/O task spawn. The dial scheduler drives one connector
//! call per candidate.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;

use ethrelay_p2p_core::{
    ConnectionDirection, DialError, NodeId, NodeRecord, RecordError, Transport,
};
use ethrelay_wire::StatusMessage;

use crate::{
    handshake::{eth_handshake, HandshakeError},
    Relay,
};

/// A request to connect to (and attach) a single candidate.
pub struct ConnectRequest {
    pub record: NodeRecord,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("candidate record carries no usable node id: {0}")]
    NoNodeId(RecordError),
    #[error("the candidate is our own node")]
    SelfDial,
    #[error("peer is already attached")]
    AlreadyAttached,
    #[error("dial failed: {0}")]
    Dial(#[from] DialError),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
}

/// Establishes outbound connections over a [`Transport`].
pub struct Connector<T: Transport> {
    relay: Relay,
    local_id: NodeId,
    local_status: StatusMessage,
    client_config: T::ClientConfig,
}

impl<T: Transport> Clone for Connector<T> {
    fn clone(&self) -> Self {
        Self {
            relay: self.relay.clone(),
            local_id: self.local_id,
            local_status: self.local_status,
            client_config: self.client_config.clone(),
        }
    }
}

impl<T: Transport> Connector<T> {
    pub fn new(
        relay: Relay,
        local_id: NodeId,
        local_status: StatusMessage,
        client_config: T::ClientConfig,
    ) -> Self {
        Self {
            relay,
            local_id,
            local_status,
            client_config,
        }
    }

    /// Dials, handshakes and attaches one candidate.
    pub async fn connect(&self, record: NodeRecord) -> Result<NodeId, ConnectError> {
        let id = record.node_id().map_err(ConnectError::NoNodeId)?;
        if id == self.local_id {
            return Err(ConnectError::SelfDial);
        }
        if self.relay.peer_set().contains(&id) {
            return Err(ConnectError::AlreadyAttached);
        }

        let (mut stream, mut sink) = T::connect_to_peer(&record, &self.client_config).await?;
        let theirs = eth_handshake(&mut stream, &mut sink, self.local_status).await?;
        let version = theirs.version.min(self.local_status.version);

        if !self
            .relay
            .attach_peer(id, ConnectionDirection::Outbound, version, stream, sink)
        {
            return Err(ConnectError::AlreadyAttached);
        }

        tracing::debug!("attached outbound peer {id} (eth/{version})");
        Ok(id)
    }
}

impl<T: Transport> Service<ConnectRequest> for Connector<T> {
    type Response = NodeId;
    type Error = ConnectError;
    type Future = Pin<Box<dyn Future<Output = Result<NodeId, ConnectError>> + Send>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConnectRequest) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { this.connect(req.record).await })
    }
}
