//! The transport seam.
//!
//! The session layer (RLPx on real deployments, an in-memory pipe in tests)
//! presents each peer connection as a framed [`Envelope`] stream/sink pair.
//! Transports only establish connections; attachment, handshaking and
//! routing live above this trait.

use futures::{Sink, Stream};

use ethrelay_wire::{Envelope, WireError};

use crate::{error::DialError, record::NodeRecord};

/// An abstraction over connection establishment for one kind of network
/// path (clearnet TCP, SOCKS5-routed Tor, in-memory test pipes).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The stream (incoming frames) type of this transport.
    type Stream: Stream<Item = Result<Envelope, WireError>> + Unpin + Send + 'static;
    /// The sink (outgoing frames) type of this transport.
    type Sink: Sink<Envelope, Error = WireError> + Unpin + Send + 'static;
    /// Configuration used when dialing out.
    type ClientConfig: Clone + Send + Sync + 'static;

    /// Connects to the peer described by `record`.
    ///
    /// This performs no protocol handshake; it only establishes the framed
    /// byte channel.
    async fn connect_to_peer(
        record: &NodeRecord,
        config: &Self::ClientConfig,
    ) -> Result<(Self::Stream, Self::Sink), DialError>;
}
