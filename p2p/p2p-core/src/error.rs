//! Core error kinds.

use ethrelay_wire::OnionAddrParsingError;

use crate::identity::NodeId;

/// Errors surfaced by the relay core while routing and proxying messages.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("the peer has disconnected")]
    PeerDisconnected,
    #[error("no peers are attached")]
    NoPeers,
    #[error("no eligible target peer for the request")]
    NoTargetPeer,
    #[error("the request timed out before a response arrived")]
    RequestTimeout,
    #[error("response carried an unknown request id: {0:#x}")]
    UnknownRequest(u64),
    #[error("response for request {request_id:#x} arrived from {got}, expected {expected}")]
    UnexpectedResponsePeer {
        request_id: u64,
        expected: NodeId,
        got: NodeId,
    },
    #[error("sending to the peer timed out")]
    SendTimeout,
}

/// Errors establishing an outbound connection.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("only-onion mode rejected a candidate without an onion address")]
    OnlyOnionNoOnion,
    #[error("tor dial failed and only-onion mode forbids clearnet fallback: {0}")]
    TorFailedNoFallback(std::io::Error),
    #[error("tor dial failed and the record has no clearnet endpoint: {0}")]
    TorFailedNoClearnet(std::io::Error),
    #[error("the record carries no dialable endpoint")]
    NoEndpoint,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors building, mutating or decoding node records.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("invalid onion3 value: {0}")]
    InvalidOnion(#[from] OnionAddrParsingError),
    #[error("record signature is invalid")]
    InvalidSignature,
    #[error("unsupported identity scheme")]
    UnsupportedScheme,
    #[error("record of {0} bytes exceeds the size limit")]
    TooLarge(usize),
    #[error("record is missing required entry: {0}")]
    MissingEntry(&'static str),
    #[error("invalid node url: {0}")]
    InvalidUrl(String),
    #[error("keyfile error: {0}")]
    Keyfile(String),
    #[error("rlp error: {0}")]
    Rlp(#[from] rlp::DecoderError),
    #[error("crypto error: {0}")]
    Crypto(#[from] secp256k1::Error),
}
