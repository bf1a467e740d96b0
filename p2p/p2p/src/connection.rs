//! Per-peer I/O tasks.
//!
//! Every attached peer gets a reader and a writer task. The reader
//! classifies frames and pushes them onto the engine's inbound queue; the
//! writer drains the peer's outbound queue into the wire sink. Either task
//! dying tears the peer down, removing it from the peer set.

use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use ethrelay_p2p_core::{ConnectionGuard, ConnectionHandle, NodeId};
use ethrelay_wire::{Envelope, WireError};

use crate::{engine::InboundMessage, peer_set::PeerSet};

/// Spawns the reader and writer tasks for an attached peer.
#[expect(clippy::too_many_arguments)]
pub(crate) fn spawn_peer_io<Str, Snk>(
    peer_set: Arc<PeerSet>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    id: NodeId,
    stream: Str,
    sink: Snk,
    outbound_rx: mpsc::Receiver<Envelope>,
    guard: ConnectionGuard,
    handle: ConnectionHandle,
) where
    Str: Stream<Item = Result<Envelope, WireError>> + Unpin + Send + 'static,
    Snk: Sink<Envelope, Error = WireError> + Unpin + Send + 'static,
{
    tokio::spawn(run_reader(peer_set, inbound_tx, id, stream, guard));
    tokio::spawn(run_writer(id, sink, outbound_rx, handle));
}

/// Reads frames off the wire, extracts the `request_id` on request and
/// response classes, and feeds the engine. Owns the connection guard: when
/// the reader exits, the peer is detached.
async fn run_reader<Str>(
    peer_set: Arc<PeerSet>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    id: NodeId,
    mut stream: Str,
    guard: ConnectionGuard,
) where
    Str: Stream<Item = Result<Envelope, WireError>> + Unpin,
{
    loop {
        let envelope = tokio::select! {
            biased;
            () = guard.should_shutdown() => break,
            frame = stream.next() => match frame {
                Some(Ok(envelope)) => envelope,
                Some(Err(e)) => {
                    tracing::debug!("wire error from {id}: {e}");
                    break;
                }
                None => break,
            },
        };

        let request_id = if envelope.id.is_request() || envelope.id.is_response() {
            match envelope.request_id() {
                Ok(request_id) => Some(request_id),
                Err(e) => {
                    tracing::debug!("{} from {id} without a readable id: {e}", envelope.id);
                    continue;
                }
            }
        } else {
            None
        };

        let message = InboundMessage {
            from: id,
            id: envelope.id,
            request_id,
            payload: envelope.payload,
        };
        // A bounded queue: a saturated engine backpressures the reader.
        if inbound_tx.send(message).await.is_err() {
            break;
        }
    }

    peer_set.remove(&id);
    guard.connection_closed();
    tracing::debug!("peer {id} detached");
}

/// Drains the peer's outbound queue into the wire sink.
async fn run_writer<Snk>(
    id: NodeId,
    mut sink: Snk,
    mut outbound_rx: mpsc::Receiver<Envelope>,
    handle: ConnectionHandle,
) where
    Snk: Sink<Envelope, Error = WireError> + Unpin,
{
    loop {
        let envelope = tokio::select! {
            biased;
            () = handle.closed() => break,
            item = outbound_rx.recv() => match item {
                Some(envelope) => envelope,
                None => break,
            },
        };

        if let Err(e) = sink.send(envelope).await {
            tracing::debug!("write to {id} failed: {e}");
            break;
        }
    }

    // Tear the whole connection down; the reader removes the peer.
    handle.disconnect();
}
