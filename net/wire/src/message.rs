// Rust Ethrelay Wire Library
// Written in 2026 by
//   Ethrelay Developers
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//

//! eth wire message identifiers and the envelope frame.

use std::fmt::{self, Display, Formatter};

use bytes::Bytes;
use rlp::Rlp;

/// Identifier of an eth wire message, carrying the on-wire message code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageId {
    Status = 0x00,
    NewBlockHashes = 0x01,
    Transactions = 0x02,
    GetBlockHeaders = 0x03,
    BlockHeaders = 0x04,
    GetBlockBodies = 0x05,
    BlockBodies = 0x06,
    NewBlock = 0x07,
    NewPooledTransactionHashes = 0x08,
    GetPooledTransactions = 0x09,
    PooledTransactions = 0x0a,
    GetReceipts = 0x0f,
    Receipts = 0x10,
    BlockRangeUpdate = 0x11,
}

impl MessageId {
    /// Maps an on-wire message code to a [`MessageId`].
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::Status,
            0x01 => Self::NewBlockHashes,
            0x02 => Self::Transactions,
            0x03 => Self::GetBlockHeaders,
            0x04 => Self::BlockHeaders,
            0x05 => Self::GetBlockBodies,
            0x06 => Self::BlockBodies,
            0x07 => Self::NewBlock,
            0x08 => Self::NewPooledTransactionHashes,
            0x09 => Self::GetPooledTransactions,
            0x0a => Self::PooledTransactions,
            0x0f => Self::GetReceipts,
            0x10 => Self::Receipts,
            0x11 => Self::BlockRangeUpdate,
            _ => return None,
        })
    }

    /// The on-wire message code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Request-class messages carry a `request_id` and are answered by
    /// exactly one paired response message.
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            Self::GetBlockHeaders
                | Self::GetBlockBodies
                | Self::GetPooledTransactions
                | Self::GetReceipts
        )
    }

    /// Response-class messages echo the `request_id` of their paired request.
    pub const fn is_response(self) -> bool {
        matches!(
            self,
            Self::BlockHeaders | Self::BlockBodies | Self::PooledTransactions | Self::Receipts
        )
    }

    /// Broadcast-class messages, fanned out to all peers except the source.
    ///
    /// [`MessageId::Status`] is handshake-only and belongs to no relay class.
    pub const fn is_gossip(self) -> bool {
        matches!(
            self,
            Self::NewBlockHashes
                | Self::Transactions
                | Self::NewBlock
                | Self::NewPooledTransactionHashes
                | Self::BlockRangeUpdate
        )
    }

    /// The response message paired with this request message.
    pub const fn response_for(self) -> Option<Self> {
        Some(match self {
            Self::GetBlockHeaders => Self::BlockHeaders,
            Self::GetBlockBodies => Self::BlockBodies,
            Self::GetPooledTransactions => Self::PooledTransactions,
            Self::GetReceipts => Self::Receipts,
            _ => return None,
        })
    }

    /// The request message paired with this response message.
    pub const fn request_for(self) -> Option<Self> {
        Some(match self {
            Self::BlockHeaders => Self::GetBlockHeaders,
            Self::BlockBodies => Self::GetBlockBodies,
            Self::PooledTransactions => Self::GetPooledTransactions,
            Self::Receipts => Self::GetReceipts,
            _ => return None,
        })
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Status => "Status",
            Self::NewBlockHashes => "NewBlockHashes",
            Self::Transactions => "Transactions",
            Self::GetBlockHeaders => "GetBlockHeaders",
            Self::BlockHeaders => "BlockHeaders",
            Self::GetBlockBodies => "GetBlockBodies",
            Self::BlockBodies => "BlockBodies",
            Self::NewBlock => "NewBlock",
            Self::NewPooledTransactionHashes => "NewPooledTransactionHashes",
            Self::GetPooledTransactions => "GetPooledTransactions",
            Self::PooledTransactions => "PooledTransactions",
            Self::GetReceipts => "GetReceipts",
            Self::Receipts => "Receipts",
            Self::BlockRangeUpdate => "BlockRangeUpdate",
        })
    }
}

/// A single framed eth message as exchanged with the session layer.
///
/// The payload is the complete RLP body of the message, including the
/// `request_id` head element for request/response-class messages. The relay
/// forwards payloads verbatim; the `request_id` is only ever *read*, never
/// rewritten, so proxied frames stay byte-identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: MessageId,
    pub payload: Bytes,
}

impl Envelope {
    pub const fn new(id: MessageId, payload: Bytes) -> Self {
        Self { id, payload }
    }

    /// Reads the `request_id` at the head of a request/response-class payload.
    pub fn request_id(&self) -> Result<u64, WireError> {
        let rlp = Rlp::new(&self.payload);
        Ok(rlp.at(0)?.as_val::<u64>()?)
    }
}

/// Errors produced while framing or interpreting wire messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unknown message code: {0:#04x}")]
    UnknownMessageCode(u8),
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
    #[error("truncated frame")]
    TruncatedFrame,
    #[error("rlp error: {0}")]
    Rlp(#[from] rlp::DecoderError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
