//! The relay engine.
//!
//! One loop consumes the inbound queue fed by the per-peer readers and
//! dispatches by message class: gossip goes through the router's ordered
//! queues inline, requests each get their own forwarder task so a slow
//! target peer cannot stall broadcast throughput, and responses resolve
//! pending requests.

use std::sync::Arc;

use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;

use ethrelay_p2p_core::NodeId;
use ethrelay_wire::MessageId;

use crate::{proxy::RequestProxy, router::MessageRouter};

/// One classified inbound message, as pushed by a peer's reader task.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub from: NodeId,
    pub id: MessageId,
    /// Present on request/response-class messages.
    pub request_id: Option<u64>,
    pub payload: Bytes,
}

/// The engine loop. Owns the inbound queue's consumer half and drives the
/// router and proxy until shutdown.
pub struct RelayEngine {
    inbound: mpsc::Receiver<InboundMessage>,
    router: Arc<MessageRouter>,
    proxy: Arc<RequestProxy>,
    quit: CancellationToken,
}

impl RelayEngine {
    pub fn new(
        inbound: mpsc::Receiver<InboundMessage>,
        router: Arc<MessageRouter>,
        proxy: Arc<RequestProxy>,
        quit: CancellationToken,
    ) -> Self {
        Self {
            inbound,
            router,
            proxy,
            quit,
        }
    }

    /// Runs until the quit token fires or the inbound queue closes, then
    /// stops the proxy sweeper and router workers and joins everything.
    pub async fn run(mut self) {
        let sweeper = tokio::spawn(Arc::clone(&self.proxy).run_sweeper());
        let mut request_tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                () = self.quit.cancelled() => break,
                // Reap finished forwarder tasks as we go.
                Some(_) = request_tasks.join_next(), if !request_tasks.is_empty() => {}
                message = self.inbound.recv() => {
                    let Some(message) = message else { break };
                    self.dispatch(message, &mut request_tasks).await;
                }
            }
        }

        tracing::debug!("relay engine shutting down");
        self.quit.cancel();
        request_tasks.shutdown().await;
        let _ = sweeper.await;
        self.router.shutdown().await;
    }

    async fn dispatch(&self, message: InboundMessage, request_tasks: &mut JoinSet<()>) {
        if message.id == MessageId::Status {
            // Status is handshake-only; a peer repeating it is misbehaving.
            tracing::debug!("dropping repeated Status from {}", message.from);
            return;
        }

        if message.id.is_request() {
            let Some(request_id) = message.request_id else {
                tracing::debug!("request {} from {} without an id", message.id, message.from);
                return;
            };

            let proxy = Arc::clone(&self.proxy);
            request_tasks.spawn(async move {
                if let Err(e) = proxy
                    .forward(message.from, message.id, request_id, message.payload)
                    .await
                {
                    tracing::debug!(
                        "failed to proxy {} {request_id:#x} from {}: {e}",
                        message.id,
                        message.from
                    );
                }
            });
            return;
        }

        if message.id.is_response() {
            let Some(request_id) = message.request_id else {
                tracing::debug!("response {} from {} without an id", message.id, message.from);
                return;
            };

            if let Err(e) =
                self.proxy
                    .deliver_response(message.from, request_id, message.payload)
            {
                tracing::debug!("dropping response from {}: {e}", message.from);
            }
            return;
        }

        // Gossip. Enqueueing blocks when the source's queue is full, which
        // is the backpressure path up to the inbound queue.
        if let Err(e) = self
            .router
            .broadcast(message.from, message.id, message.payload)
            .await
        {
            tracing::debug!("broadcast from {} failed: {e}", message.from);
        }
    }
}
