//! The dial scheduler.
//!
//! Pulls candidates off the discovery mix and hands each one to the
//! connector, respecting the peer cap and a bound on concurrent dials.
//! There is no retry policy here: a failed candidate is dropped, and
//! discovery (or the static-nodes source) will offer it again.

use futures::StreamExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use ethrelay_p2p_core::Transport;

use crate::{
    connector::{ConnectRequest, Connector},
    constants::DIAL_CONCURRENCY,
    discovery::NodeStream,
    Relay,
};

pub struct DialScheduler<T: Transport> {
    connector: Connector<T>,
    relay: Relay,
    max_peers: usize,
    quit: CancellationToken,
}

impl<T: Transport> DialScheduler<T> {
    pub fn new(
        connector: Connector<T>,
        relay: Relay,
        max_peers: usize,
        quit: CancellationToken,
    ) -> Self {
        Self {
            connector,
            relay,
            max_peers,
            quit,
        }
    }

    /// Runs until shutdown or until the candidate stream ends.
    pub async fn run(self, mut candidates: NodeStream) {
        let mut dials: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                () = self.quit.cancelled() => break,
                Some(_) = dials.join_next(), if !dials.is_empty() => {}
                candidate = candidates.next(), if dials.len() < DIAL_CONCURRENCY => {
                    let Some(record) = candidate else { break };
                    if self.relay.peer_count() >= self.max_peers {
                        continue;
                    }

                    let connector = self.connector.clone();
                    dials.spawn(async move {
                        if let Err(e) = connector.oneshot(ConnectRequest { record }).await {
                            tracing::debug!("outbound dial failed: {e}");
                        }
                    });
                }
            }
        }

        dials.shutdown().await;
        tracing::debug!("dial scheduler stopped");
    }
}
