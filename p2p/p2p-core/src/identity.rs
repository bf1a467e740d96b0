//! The local node identity.
//!
//! A secp256k1 key pair with the derived 32-byte node id. The identity is
//! stable for the lifetime of the process; it is loaded from a keyfile when
//! one exists and freshly generated otherwise.

use std::{
    fmt::{self, Debug, Display, Formatter},
    fs,
    io::Write,
    path::Path,
};

use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use sha3::{Digest, Keccak256};

use crate::error::RecordError;

/// A 32-byte node identifier: the keccak256 hash of the node's uncompressed
/// secp256k1 public key.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; 32]);

impl NodeId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derives the node id from a public key.
    pub fn from_public_key(key: &PublicKey) -> Self {
        let uncompressed = key.serialize_uncompressed();
        let digest = Keccak256::digest(&uncompressed[1..]);
        Self(digest.into())
    }
}

/// Short hex form for logs.
impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", hex::encode(&self.0[..4]))
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(self.0))
    }
}

/// The local secp256k1 identity.
pub struct NodeIdentity {
    secret: SecretKey,
    public: PublicKey,
    id: NodeId,
}

impl NodeIdentity {
    /// Generates a fresh identity.
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::new(&mut rand::thread_rng()))
    }

    /// Builds the identity from an existing secret key.
    pub fn from_secret(secret: SecretKey) -> Self {
        let public = PublicKey::from_secret_key(SECP256K1, &secret);
        Self {
            secret,
            public,
            id: NodeId::from_public_key(&public),
        }
    }

    /// Loads the identity from a hex keyfile, generating (and persisting) a
    /// fresh one when the file does not exist.
    pub fn load_or_generate(path: &Path) -> Result<Self, RecordError> {
        if path.exists() {
            let hex_key = fs::read_to_string(path)
                .map_err(|e| RecordError::Keyfile(format!("{}: {e}", path.display())))?;
            let bytes = hex::decode(hex_key.trim())
                .map_err(|e| RecordError::Keyfile(format!("{}: {e}", path.display())))?;
            return Ok(Self::from_secret(SecretKey::from_slice(&bytes)?));
        }

        let identity = Self::generate();
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let mut file = fs::File::create(path)
            .map_err(|e| RecordError::Keyfile(format!("{}: {e}", path.display())))?;
        let _ = writeln!(file, "{}", hex::encode(identity.secret.secret_bytes()));

        Ok(identity)
    }

    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub const fn node_id(&self) -> NodeId {
        self.id
    }

    /// Signs a 32-byte digest, returning the 64-byte compact `r || s` form
    /// used by the `v4` record identity scheme.
    pub fn sign_digest(&self, digest: [u8; 32]) -> [u8; 64] {
        SECP256K1
            .sign_ecdsa(&Message::from_digest(digest), &self.secret)
            .serialize_compact()
    }
}

impl Debug for NodeIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Never print the secret.
        f.debug_struct("NodeIdentity").field("id", &self.id).finish()
    }
}
