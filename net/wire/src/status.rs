//! The eth Status handshake message.
//!
//! The relay answers Status from its configured chain preset and block-range
//! settings; it never derives any of these fields from a peer or a database.

use ethereum_types::H256;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use crate::{chain::Chain, forkid::ForkId};

/// The eth protocol version this node speaks.
pub const ETH_VERSION: u32 = 69;

/// The served block range advertised in Status and `BlockRangeUpdate`.
///
/// ETH69 requires a non-empty `latest_hash`; a relay with no configured
/// latest block advertises the genesis hash instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlockRange {
    pub earliest: u64,
    pub latest: u64,
    pub latest_hash: H256,
}

impl BlockRange {
    /// The empty range of a node that serves no blocks at all.
    pub fn genesis_only(chain: Chain) -> Self {
        Self {
            earliest: 0,
            latest: 0,
            latest_hash: chain.genesis_hash(),
        }
    }
}

/// The Status message (code `0x00`), ETH69 layout:
/// `[version, networkid, genesis, forkid, earliest, latest, latest_hash]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub version: u32,
    pub network_id: u64,
    pub genesis_hash: H256,
    pub fork_id: ForkId,
    pub block_range: BlockRange,
}

impl StatusMessage {
    /// Builds the local Status from hard-coded chain parameters.
    pub fn local(chain: Chain, network_id: u64, fork_id: ForkId, block_range: BlockRange) -> Self {
        let mut block_range = block_range;
        if block_range.latest_hash.is_zero() {
            block_range.latest_hash = chain.genesis_hash();
        }

        Self {
            version: ETH_VERSION,
            network_id,
            genesis_hash: chain.genesis_hash(),
            fork_id,
            block_range,
        }
    }
}

impl Encodable for StatusMessage {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(7);
        s.append(&self.version);
        s.append(&self.network_id);
        s.append(&self.genesis_hash);
        s.append(&self.fork_id);
        s.append(&self.block_range.earliest);
        s.append(&self.block_range.latest);
        s.append(&self.block_range.latest_hash);
    }
}

impl Decodable for StatusMessage {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 7 {
            return Err(DecoderError::RlpIncorrectListLen);
        }

        Ok(Self {
            version: rlp.val_at(0)?,
            network_id: rlp.val_at(1)?,
            genesis_hash: rlp.val_at(2)?,
            fork_id: rlp.val_at(3)?,
            block_range: BlockRange {
                earliest: rlp.val_at(4)?,
                latest: rlp.val_at(5)?,
                latest_hash: rlp.val_at(6)?,
            },
        })
    }
}
