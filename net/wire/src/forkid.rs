//! EIP-2124 fork identifiers.
//!
//! The relay owns no chain state, so its fork identifier is computed once at
//! startup from the chain preset and never changes afterwards.

use ethereum_types::H256;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// CRC32 checksum over the genesis hash and every passed fork activation
/// point, each point hashed as an 8-byte big-endian integer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ForkHash(pub [u8; 4]);

impl ForkHash {
    /// Computes the fork hash for a chain whose listed activation points have
    /// all been passed.
    pub fn from_activations(genesis: H256, activations: &[u64]) -> Self {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(genesis.as_bytes());
        for point in activations {
            hasher.update(&point.to_be_bytes());
        }
        Self(hasher.finalize().to_be_bytes())
    }
}

impl Encodable for ForkHash {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append(&self.0.to_vec());
    }
}

impl Decodable for ForkHash {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        let bytes: Vec<u8> = rlp.as_val()?;
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| DecoderError::Custom("fork hash must be exactly 4 bytes"))
    }
}

/// The `{hash, next}` pair advertised in the Status handshake and the `eth`
/// ENR entry.
///
/// `next` is the activation point (block number or timestamp) of the next
/// scheduled-but-unreached fork, or zero when none is scheduled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ForkId {
    pub hash: ForkHash,
    pub next: u64,
}

impl ForkId {
    pub const fn new(hash: ForkHash, next: u64) -> Self {
        Self { hash, next }
    }

    /// Encodes this fork id as the value of the `eth` ENR entry:
    /// `[hash (4 bytes), next (uint64)]`.
    pub fn to_enr_entry(self) -> Vec<u8> {
        rlp::encode(&self).to_vec()
    }

    /// Decodes the `eth` ENR entry, tolerating a forwards-compatible tail of
    /// extra list items.
    pub fn from_enr_entry(entry: &[u8]) -> Result<Self, DecoderError> {
        let rlp = Rlp::new(entry);
        if rlp.item_count()? < 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            hash: rlp.val_at(0)?,
            next: rlp.val_at(1)?,
        })
    }
}

impl Encodable for ForkId {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.hash);
        s.append(&self.next);
    }
}

impl Decodable for ForkId {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            hash: rlp.val_at(0)?,
            next: rlp.val_at(1)?,
        })
    }
}
