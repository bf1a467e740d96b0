//! # Ethrelay Wire
//!
//! The eth wire-protocol surface of the relay: message identifiers and their
//! request/response pairing, the framed envelope contract exposed by the
//! session layer, the Status handshake message, fork identifiers and the
//! chain presets they are derived from.
//!
//! This crate is deliberately thin. The relay never decodes message bodies
//! beyond what routing needs (the `request_id` at the head of request-class
//! payloads); everything else is carried as opaque bytes.

pub mod chain;
pub mod codec;
pub mod forkid;
pub mod message;
pub mod onion;
pub mod status;

pub use chain::Chain;
pub use codec::EnvelopeCodec;
pub use forkid::{ForkHash, ForkId};
pub use message::{Envelope, MessageId, WireError};
pub use onion::{OnionAddr, OnionAddrParsingError};
pub use status::{BlockRange, StatusMessage, ETH_VERSION};
