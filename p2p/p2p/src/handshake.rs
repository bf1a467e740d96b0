//! The eth Status exchange.
//!
//! Runs once per connection during attachment. The relay answers with its
//! hard-coded chain, fork-id and block-range parameters; nothing in the
//! local Status ever derives from a peer.

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::timeout;

use ethrelay_wire::{Envelope, MessageId, StatusMessage, WireError};

use crate::{constants::HANDSHAKE_TIMEOUT, discovery::fork_compatible};

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("handshake timed out")]
    Timeout,
    #[error("peer closed the connection during the handshake")]
    PeerClosed,
    #[error("expected Status, peer sent {0}")]
    UnexpectedMessage(MessageId),
    #[error("peer is on network {theirs}, we are on {ours}")]
    WrongNetwork { ours: u64, theirs: u64 },
    #[error("peer has a different genesis hash")]
    WrongGenesis,
    #[error("peer's fork id is incompatible with ours")]
    IncompatibleFork,
    #[error("peer speaks eth/{0}, which is too old")]
    VersionTooOld(u32),
    #[error("peer advertised an empty latest hash")]
    EmptyLatestHash,
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("malformed Status: {0}")]
    Rlp(#[from] rlp::DecoderError),
}

/// Performs the Status exchange on a fresh connection.
///
/// Sends the local Status, awaits the peer's, and validates network id,
/// genesis hash, fork-id compatibility and protocol version. Returns the
/// peer's Status; the negotiated version is the minimum of both sides.
pub async fn eth_handshake<Str, Snk>(
    stream: &mut Str,
    sink: &mut Snk,
    local: StatusMessage,
) -> Result<StatusMessage, HandshakeError>
where
    Str: Stream<Item = Result<Envelope, WireError>> + Unpin,
    Snk: Sink<Envelope, Error = WireError> + Unpin,
{
    timeout(HANDSHAKE_TIMEOUT, exchange(stream, sink, local))
        .await
        .map_err(|_| HandshakeError::Timeout)?
}

async fn exchange<Str, Snk>(
    stream: &mut Str,
    sink: &mut Snk,
    local: StatusMessage,
) -> Result<StatusMessage, HandshakeError>
where
    Str: Stream<Item = Result<Envelope, WireError>> + Unpin,
    Snk: Sink<Envelope, Error = WireError> + Unpin,
{
    let payload = Bytes::from(rlp::encode(&local).to_vec());
    sink.send(Envelope::new(MessageId::Status, payload)).await?;

    let envelope = stream.next().await.ok_or(HandshakeError::PeerClosed)??;
    if envelope.id != MessageId::Status {
        return Err(HandshakeError::UnexpectedMessage(envelope.id));
    }

    let theirs: StatusMessage = rlp::decode(&envelope.payload)?;
    validate(&local, &theirs)?;
    Ok(theirs)
}

fn validate(ours: &StatusMessage, theirs: &StatusMessage) -> Result<(), HandshakeError> {
    if theirs.version < ours.version {
        return Err(HandshakeError::VersionTooOld(theirs.version));
    }
    if theirs.network_id != ours.network_id {
        return Err(HandshakeError::WrongNetwork {
            ours: ours.network_id,
            theirs: theirs.network_id,
        });
    }
    if theirs.genesis_hash != ours.genesis_hash {
        return Err(HandshakeError::WrongGenesis);
    }
    if !fork_compatible(ours.fork_id, theirs.fork_id) {
        return Err(HandshakeError::IncompatibleFork);
    }
    if theirs.block_range.latest_hash.is_zero() {
        return Err(HandshakeError::EmptyLatestHash);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use ethrelay_wire::{
        BlockRange, Chain, Envelope, EnvelopeCodec, ForkHash, ForkId, MessageId, StatusMessage,
    };

    use super::{eth_handshake, HandshakeError};

    fn local_status(chain: Chain) -> StatusMessage {
        StatusMessage::local(
            chain,
            chain.network_id(),
            chain.fork_id(),
            BlockRange::genesis_only(chain),
        )
    }

    /// Two in-memory endpoints speaking envelope frames.
    fn pipe() -> (
        (
            FramedRead<tokio::io::ReadHalf<tokio::io::DuplexStream>, EnvelopeCodec>,
            FramedWrite<tokio::io::WriteHalf<tokio::io::DuplexStream>, EnvelopeCodec>,
        ),
        (
            FramedRead<tokio::io::ReadHalf<tokio::io::DuplexStream>, EnvelopeCodec>,
            FramedWrite<tokio::io::WriteHalf<tokio::io::DuplexStream>, EnvelopeCodec>,
        ),
    ) {
        let (left, right) = tokio::io::duplex(64 * 1024);
        let (lr, lw) = tokio::io::split(left);
        let (rr, rw) = tokio::io::split(right);
        (
            (
                FramedRead::new(lr, EnvelopeCodec::default()),
                FramedWrite::new(lw, EnvelopeCodec::default()),
            ),
            (
                FramedRead::new(rr, EnvelopeCodec::default()),
                FramedWrite::new(rw, EnvelopeCodec::default()),
            ),
        )
    }

    #[tokio::test]
    async fn both_sides_complete_against_each_other() {
        let ((mut lstream, mut lsink), (mut rstream, mut rsink)) = pipe();
        let status = local_status(Chain::Mainnet);

        let left = tokio::spawn(async move {
            eth_handshake(&mut lstream, &mut lsink, status).await
        });
        let right = tokio::spawn(async move {
            eth_handshake(&mut rstream, &mut rsink, status).await
        });

        let theirs = left.await.unwrap().unwrap();
        assert_eq!(theirs, status);
        right.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wrong_network_is_rejected() {
        let ((mut lstream, mut lsink), (mut rstream, mut rsink)) = pipe();

        let left = tokio::spawn(async move {
            eth_handshake(&mut lstream, &mut lsink, local_status(Chain::Mainnet)).await
        });
        let right = tokio::spawn(async move {
            eth_handshake(&mut rstream, &mut rsink, local_status(Chain::Sepolia)).await
        });

        assert!(matches!(
            left.await.unwrap(),
            Err(HandshakeError::WrongNetwork { .. })
        ));
        assert!(right.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn incompatible_fork_is_rejected() {
        let ((mut lstream, mut lsink), (_rstream, mut rsink)) = pipe();

        // Same chain, but the remote claims a different fork history and a
        // `next` behind ours.
        let mut ours = local_status(Chain::Mainnet);
        ours.fork_id = ForkId::new(ForkHash([1, 2, 3, 4]), 100);
        let mut theirs = ours;
        theirs.fork_id = ForkId::new(ForkHash([5, 6, 7, 8]), 50);

        let left = tokio::spawn(async move {
            eth_handshake(&mut lstream, &mut lsink, ours).await
        });

        let payload = bytes::Bytes::from(rlp::encode(&theirs).to_vec());
        rsink
            .send(Envelope::new(MessageId::Status, payload))
            .await
            .unwrap();

        assert!(matches!(
            left.await.unwrap(),
            Err(HandshakeError::IncompatibleFork)
        ));
    }

    #[tokio::test]
    async fn non_status_first_message_is_rejected() {
        let ((mut lstream, mut lsink), (_rstream, mut rsink)) = pipe();

        let left = tokio::spawn(async move {
            eth_handshake(&mut lstream, &mut lsink, local_status(Chain::Mainnet)).await
        });

        rsink
            .send(Envelope::new(
                MessageId::Transactions,
                bytes::Bytes::from_static(&[0xc0]),
            ))
            .await
            .unwrap();

        assert!(matches!(
            left.await.unwrap(),
            Err(HandshakeError::UnexpectedMessage(MessageId::Transactions))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let ((mut lstream, mut lsink), _other) = pipe();

        let res = eth_handshake(&mut lstream, &mut lsink, local_status(Chain::Mainnet)).await;
        assert!(matches!(res, Err(HandshakeError::Timeout)));
    }
}
