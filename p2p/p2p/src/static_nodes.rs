//! Static nodes.
//!
//! Configured peers the relay always tries to stay connected to. They join
//! the discovery mix as one more source: while a static node is not in the
//! peer set, it is re-offered to the dial scheduler every
//! [`STATIC_REDIAL_INTERVAL`](crate::constants::STATIC_REDIAL_INTERVAL).

use std::{collections::VecDeque, sync::Arc};

use futures::{stream, StreamExt};

use ethrelay_p2p_core::NodeRecord;

use crate::{constants::STATIC_REDIAL_INTERVAL, discovery::NodeStream, peer_set::PeerSet};

/// An endless stream of the configured records that are currently
/// disconnected. The first batch is offered immediately.
pub fn static_nodes_stream(records: Vec<NodeRecord>, peer_set: Arc<PeerSet>) -> NodeStream {
    let ticker = tokio::time::interval(STATIC_REDIAL_INTERVAL);
    let pending: VecDeque<NodeRecord> = VecDeque::new();

    stream::unfold(
        (pending, records, peer_set, ticker),
        |(mut pending, records, peer_set, mut ticker)| async move {
            loop {
                if let Some(record) = pending.pop_front() {
                    return Some((record, (pending, records, peer_set, ticker)));
                }

                ticker.tick().await;
                pending.extend(
                    records
                        .iter()
                        .filter(|record| {
                            record
                                .node_id()
                                .is_ok_and(|id| !peer_set.contains(&id))
                        })
                        .cloned(),
                );
            }
        },
    )
    .boxed()
}
