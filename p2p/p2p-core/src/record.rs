//! Signed node records.
//!
//! An append-only keyed bag of entries, signed under the `v4` identity
//! scheme: the record content is the RLP list `[seq, k1, v1, k2, v2, …]`
//! with keys sorted, signed as the 64-byte compact secp256k1 signature of
//! its keccak256 digest. Every mutation strictly increments `seq` and
//! re-signs.
//!
//! Records parsed from `enode://` URLs are unsigned candidates: they carry
//! endpoint entries and optionally a DNS hostname, which is not part of the
//! signed content.

use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    str::FromStr,
};

use rlp::{Rlp, RlpStream};
use secp256k1::{ecdsa::Signature, Message, PublicKey, SECP256K1};
use sha3::{Digest, Keccak256};

use ethrelay_wire::{ForkId, OnionAddr};

use crate::{
    constants::{DEFAULT_P2P_PORT, MAX_RECORD_SIZE},
    error::RecordError,
    identity::{NodeId, NodeIdentity},
};

/// The only identity scheme this node speaks.
const ID_SCHEME: &[u8] = b"v4";

/// A node record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    seq: u64,
    signature: Option<[u8; 64]>,
    /// Entry values stored as raw RLP items, keyed in sorted order.
    pairs: BTreeMap<Vec<u8>, Vec<u8>>,
    /// DNS hostname carried alongside URL-built records; never signed.
    hostname: Option<String>,
}

impl NodeRecord {
    /// Creates a fresh signed record for the local identity, carrying only
    /// the identity-scheme and public-key entries.
    pub fn new(identity: &NodeIdentity) -> Self {
        let mut record = Self {
            seq: 0,
            signature: None,
            pairs: BTreeMap::new(),
            hostname: None,
        };

        record.pairs.insert(
            b"id".to_vec(),
            rlp::encode(&ID_SCHEME.to_vec()).to_vec(),
        );
        record.pairs.insert(
            b"secp256k1".to_vec(),
            rlp::encode(&identity.public_key().serialize().to_vec()).to_vec(),
        );
        record.resign(identity);
        record
    }

    /// The record sequence number.
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    pub const fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// The raw RLP value of an entry.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.pairs.get(key).map(Vec::as_slice)
    }

    fn content_digest(&self) -> [u8; 32] {
        let mut s = RlpStream::new_list(1 + 2 * self.pairs.len());
        s.append(&self.seq);
        for (key, value) in &self.pairs {
            s.append(key);
            s.append_raw(value, 1);
        }
        Keccak256::digest(s.out()).into()
    }

    fn resign(&mut self, identity: &NodeIdentity) {
        self.seq += 1;
        self.signature = Some(identity.sign_digest(self.content_digest()));
    }

    /// Inserts or replaces an entry, bumping `seq` and re-signing.
    fn set_raw(&mut self, key: &[u8], raw_value: Vec<u8>, identity: &NodeIdentity) {
        self.pairs.insert(key.to_vec(), raw_value);
        self.resign(identity);
    }

    pub fn set_ip4(&mut self, ip: Ipv4Addr, identity: &NodeIdentity) {
        self.set_raw(b"ip", rlp::encode(&ip.octets().to_vec()).to_vec(), identity);
    }

    pub fn set_tcp_port(&mut self, port: u16, identity: &NodeIdentity) {
        self.set_raw(b"tcp", rlp::encode(&port).to_vec(), identity);
    }

    pub fn set_udp_port(&mut self, port: u16, identity: &NodeIdentity) {
        self.set_raw(b"udp", rlp::encode(&port).to_vec(), identity);
    }

    /// Sets the `eth` entry to the given fork id.
    pub fn set_fork_id(&mut self, fork_id: ForkId, identity: &NodeIdentity) {
        self.set_raw(b"eth", fork_id.to_enr_entry(), identity);
    }

    /// Sets the `onion3` entry. The value must match the v3 onion grammar;
    /// anything else is rejected without touching the record.
    pub fn set_onion3(&mut self, addr: &str, identity: &NodeIdentity) -> Result<(), RecordError> {
        let onion = OnionAddr::from_str(addr)?;
        self.set_raw(
            b"onion3",
            rlp::encode(&onion.to_string().into_bytes()).to_vec(),
            identity,
        );
        Ok(())
    }

    pub fn ip(&self) -> Option<IpAddr> {
        if let Some(raw) = self.get(b"ip") {
            let octets: Vec<u8> = Rlp::new(raw).as_val().ok()?;
            let octets: [u8; 4] = octets.try_into().ok()?;
            return Some(IpAddr::V4(Ipv4Addr::from(octets)));
        }
        let raw = self.get(b"ip6")?;
        let octets: Vec<u8> = Rlp::new(raw).as_val().ok()?;
        let octets: [u8; 16] = octets.try_into().ok()?;
        Some(IpAddr::V6(Ipv6Addr::from(octets)))
    }

    pub fn tcp_port(&self) -> Option<u16> {
        Rlp::new(self.get(b"tcp")?).as_val().ok()
    }

    pub fn udp_port(&self) -> Option<u16> {
        Rlp::new(self.get(b"udp")?).as_val().ok()
    }

    /// The clearnet TCP endpoint, when the record carries an IP address.
    /// A missing `tcp` entry falls back to the protocol default port.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        Some(SocketAddr::new(
            self.ip()?,
            self.tcp_port().unwrap_or(DEFAULT_P2P_PORT),
        ))
    }

    /// The fork id from the `eth` entry, if present and well-formed.
    pub fn fork_id(&self) -> Option<ForkId> {
        ForkId::from_enr_entry(self.get(b"eth")?).ok()
    }

    /// The `onion3` entry, if present and well-formed.
    pub fn onion3(&self) -> Option<OnionAddr> {
        let raw: Vec<u8> = Rlp::new(self.get(b"onion3")?).as_val().ok()?;
        OnionAddr::from_str(std::str::from_utf8(&raw).ok()?).ok()
    }

    /// The public key from the `secp256k1` entry.
    pub fn public_key(&self) -> Result<PublicKey, RecordError> {
        let raw = self
            .get(b"secp256k1")
            .ok_or(RecordError::MissingEntry("secp256k1"))?;
        let bytes: Vec<u8> = Rlp::new(raw).as_val()?;
        Ok(PublicKey::from_slice(&bytes)?)
    }

    /// The node id derived from the record's public key.
    pub fn node_id(&self) -> Result<NodeId, RecordError> {
        Ok(NodeId::from_public_key(&self.public_key()?))
    }

    /// Encodes the record as `[signature, seq, k1, v1, …]`.
    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        let signature = self.signature.ok_or(RecordError::MissingEntry("signature"))?;

        let mut s = RlpStream::new_list(2 + 2 * self.pairs.len());
        s.append(&signature.to_vec());
        s.append(&self.seq);
        for (key, value) in &self.pairs {
            s.append(key);
            s.append_raw(value, 1);
        }

        let encoded = s.out().to_vec();
        if encoded.len() > MAX_RECORD_SIZE {
            return Err(RecordError::TooLarge(encoded.len()));
        }
        Ok(encoded)
    }

    /// Decodes and verifies a record: size limit, `v4` identity scheme,
    /// sorted unique keys, and a valid signature under the embedded key.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() > MAX_RECORD_SIZE {
            return Err(RecordError::TooLarge(bytes.len()));
        }

        let rlp = Rlp::new(bytes);
        let item_count = rlp.item_count()?;
        if item_count < 2 || item_count % 2 != 0 {
            return Err(RecordError::Rlp(rlp::DecoderError::RlpIncorrectListLen));
        }

        let signature: Vec<u8> = rlp.val_at(0)?;
        let signature: [u8; 64] = signature
            .try_into()
            .map_err(|_| RecordError::InvalidSignature)?;
        let seq: u64 = rlp.val_at(1)?;

        let mut pairs = BTreeMap::new();
        let mut previous_key: Option<Vec<u8>> = None;
        for i in (2..item_count).step_by(2) {
            let key: Vec<u8> = rlp.val_at(i)?;
            if previous_key.as_ref().is_some_and(|prev| *prev >= key) {
                return Err(RecordError::Rlp(rlp::DecoderError::Custom(
                    "record keys must be sorted and unique",
                )));
            }
            let value = rlp.at(i + 1)?.as_raw().to_vec();
            previous_key = Some(key.clone());
            pairs.insert(key, value);
        }

        let record = Self {
            seq,
            signature: Some(signature),
            pairs,
            hostname: None,
        };

        if record.get(b"id") != Some(rlp::encode(&ID_SCHEME.to_vec()).as_ref()) {
            return Err(RecordError::UnsupportedScheme);
        }

        let public_key = record.public_key()?;
        let sig = Signature::from_compact(&signature)?;
        SECP256K1
            .verify_ecdsa(
                &Message::from_digest(record.content_digest()),
                &sig,
                &public_key,
            )
            .map_err(|_| RecordError::InvalidSignature)?;

        Ok(record)
    }

    /// Parses an `enode://<pubkey>@<host>:<port>[?discport=…]` URL into an
    /// unsigned candidate record. `.onion` and other DNS hostnames are kept
    /// out of the signed content, on the record's hostname slot.
    pub fn from_enode_url(url: &str) -> Result<Self, RecordError> {
        let invalid = || RecordError::InvalidUrl(url.to_string());

        let rest = url.strip_prefix("enode://").ok_or_else(invalid)?;
        let (id_hex, endpoint) = rest.split_once('@').ok_or_else(invalid)?;
        let endpoint = endpoint.split('?').next().ok_or_else(invalid)?;
        let (host, port) = endpoint.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;

        let id_bytes = hex::decode(id_hex).map_err(|_| invalid())?;
        if id_bytes.len() != 64 {
            return Err(invalid());
        }
        let mut uncompressed = [0_u8; 65];
        uncompressed[0] = 0x04;
        uncompressed[1..].copy_from_slice(&id_bytes);
        let public_key = PublicKey::from_slice(&uncompressed)?;

        let mut pairs = BTreeMap::new();
        pairs.insert(
            b"id".to_vec(),
            rlp::encode(&ID_SCHEME.to_vec()).to_vec(),
        );
        pairs.insert(
            b"secp256k1".to_vec(),
            rlp::encode(&public_key.serialize().to_vec()).to_vec(),
        );
        pairs.insert(b"tcp".to_vec(), rlp::encode(&port).to_vec());

        // IPv6 hosts come bracketed in URLs.
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        let mut hostname = None;
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => {
                pairs.insert(b"ip".to_vec(), rlp::encode(&ip.octets().to_vec()).to_vec());
            }
            Ok(IpAddr::V6(ip)) => {
                pairs.insert(b"ip6".to_vec(), rlp::encode(&ip.octets().to_vec()).to_vec());
            }
            Err(_) => {
                if host.is_empty() {
                    return Err(invalid());
                }
                hostname = Some(host.to_string());
            }
        }

        Ok(Self {
            seq: 0,
            signature: None,
            pairs,
            hostname,
        })
    }
}
