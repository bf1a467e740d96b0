//! # Ethrelay P2P Core
//!
//! Low-level building blocks shared by the relay: the node identity and its
//! signed node record, attached-peer handles, the transport seam the session
//! layer plugs into, and the core error kinds.
//!
//! Everything here is deliberately free of relay policy; routing and
//! proxying live in `ethrelay-p2p`.

pub mod constants;
pub mod error;
pub mod handles;
pub mod identity;
pub mod peer;
pub mod record;
pub mod transport;

pub use error::{DialError, RecordError, RelayError};
pub use handles::{connection_handles, ConnectionGuard, ConnectionHandle};
pub use identity::{NodeId, NodeIdentity};
pub use peer::Peer;
pub use record::NodeRecord;
pub use transport::Transport;

/// The direction of a connection.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionDirection {
    /// An inbound connection to our node.
    Inbound,
    /// An outbound connection from our node.
    Outbound,
}
