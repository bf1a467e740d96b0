//! Chain presets.
//!
//! A preset pins everything the relay advertises about a chain: network id,
//! genesis hash, the passed fork activation points the fork id is derived
//! from, and the default discovery endpoints.

use std::str::FromStr;

use ethereum_types::H256;
use hex_literal::hex;

use crate::forkid::{ForkHash, ForkId};

/// A supported chain preset.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Chain {
    #[default]
    Mainnet,
    Holesky,
    Sepolia,
}

/// Mainnet fork activation points: deduplicated block numbers, then fork
/// timestamps, in activation order.
const MAINNET_ACTIVATIONS: &[u64] = &[
    1_150_000,  // Homestead
    1_920_000,  // DAO
    2_463_000,  // Tangerine Whistle
    2_675_000,  // Spurious Dragon
    4_370_000,  // Byzantium
    7_280_000,  // Constantinople & Petersburg
    9_069_000,  // Istanbul
    9_200_000,  // Muir Glacier
    12_244_000, // Berlin
    12_965_000, // London
    13_773_000, // Arrow Glacier
    15_050_000, // Gray Glacier
    1_681_338_455, // Shanghai
    1_710_338_135, // Cancun
    1_746_612_311, // Prague
];

const HOLESKY_ACTIVATIONS: &[u64] = &[
    1_696_000_704, // Shanghai
    1_707_305_664, // Cancun
    1_740_434_112, // Prague
];

const SEPOLIA_ACTIVATIONS: &[u64] = &[
    1_735_371,     // Merge netsplit
    1_677_557_088, // Shanghai
    1_706_655_072, // Cancun
    1_741_159_776, // Prague
];

impl Chain {
    pub const fn network_id(self) -> u64 {
        match self {
            Self::Mainnet => 1,
            Self::Holesky => 17_000,
            Self::Sepolia => 11_155_111,
        }
    }

    pub fn genesis_hash(self) -> H256 {
        H256(match self {
            Self::Mainnet => {
                hex!("d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3")
            }
            Self::Holesky => {
                hex!("b5f7f912443c940f21fd611f12828d75b534364ed9e95ca4e307729a4661bde4")
            }
            Self::Sepolia => {
                hex!("25a5cc106eea7138acab33231d7160d69cb777ee0c2c553fcddf5138993e6dd9")
            }
        })
    }

    /// All fork activation points of this preset, every one of them passed.
    pub const fn fork_activations(self) -> &'static [u64] {
        match self {
            Self::Mainnet => MAINNET_ACTIVATIONS,
            Self::Holesky => HOLESKY_ACTIVATIONS,
            Self::Sepolia => SEPOLIA_ACTIVATIONS,
        }
    }

    /// The fork id advertised for this preset. No fork is scheduled beyond
    /// the listed activations, so `next` is always zero.
    pub fn fork_id(self) -> ForkId {
        ForkId::new(
            ForkHash::from_activations(self.genesis_hash(), self.fork_activations()),
            0,
        )
    }

    /// Default bootstrap node URLs for this chain.
    pub const fn bootnodes(self) -> &'static [&'static str] {
        match self {
            Self::Mainnet => &[
                "enode://d860a01f9722d78051619d1e2351aba3f43f943f6f00718d1b9baa4101932a1f5011f16bb2b1bb35db20d6fe28fa0bf09636d26a87d31de9ec6203eeedb1f666@18.138.108.67:30303",
                "enode://22a8232c3abc76a16ae9d6c3b164f98775fe226f0917b0ca871128a74a8e9630b458460865bab457221f1d448dd9791d24c4e5d88786180ac185df813a68d4de@3.209.45.79:30303",
                "enode://2b252ab6a1d0f971d9722cb839a42cb81db019ba44c08754628ab4a823487071b5695317c8ccd085219c3a03af063495b2f1da8d18218da2d6a82981b45e6ffc@65.108.70.101:30303",
            ],
            Self::Holesky => &[
                "enode://ac906289e4b7f12df423d654c5a962b6ebe5b3a74cc9e06292a85221f9a64a6f1cfdd6b714ed6dacef51578f92b34c60ee91e9ede9c7f8fadc4d347326d95e2b@146.190.13.128:30303",
                "enode://a3435a0155a3e837c02f5e7f5662a2f1fbc25b48e4dc232016e1c51b544cb5b4510ef633ea3278c0e970fa8ad8141e2d4d0f9f95456c537ff05fdf9b31c15072@178.128.136.233:30303",
            ],
            Self::Sepolia => &[
                "enode://4e5e92199ee224a01932a377160aa432f31d0b351f84ab413a8e0a42f4f36476f8fb1cbe914af0d9aef0d51665c214cf653c651c4bbd9d5550a934f241f1682b@138.197.51.181:30303",
                "enode://143e11fb766781d22d92a2e33f8f104cddae4411a122295ed1fdb6638de96a6ce65f5b7c964ba3763bba27961738fef7d3ecc739268f3e5e771fb4c87b6234ba@146.190.1.103:30303",
            ],
        }
    }
}

impl FromStr for Chain {
    type Err = UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Self::Mainnet),
            "holesky" => Ok(Self::Holesky),
            "sepolia" => Ok(Self::Sepolia),
            other => Err(UnknownChain(other.to_string())),
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Mainnet => "mainnet",
            Self::Holesky => "holesky",
            Self::Sepolia => "sepolia",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown chain preset: {0}")]
pub struct UnknownChain(pub String);

#[cfg(test)]
mod tests {
    use super::Chain;
    use crate::forkid::ForkHash;

    /// The advertised mainnet fork hashes at Shanghai, Cancun and Prague, as
    /// computed by every other eth client.
    #[test]
    fn mainnet_head_fork_hashes() {
        let genesis = Chain::Mainnet.genesis_hash();
        let all = Chain::Mainnet.fork_activations();

        // Through Shanghai (activations up to and including 1681338455).
        assert_eq!(
            ForkHash::from_activations(genesis, &all[..13]),
            ForkHash([0xdc, 0xe9, 0x6c, 0x2d])
        );
        // Through Cancun.
        assert_eq!(
            ForkHash::from_activations(genesis, &all[..14]),
            ForkHash([0x9f, 0x3d, 0x22, 0x54])
        );
        // Through Prague, the current head.
        assert_eq!(
            Chain::Mainnet.fork_id().hash,
            ForkHash([0xc3, 0x76, 0xcf, 0x8b])
        );
    }

    #[test]
    fn fork_ids_differ_across_chains() {
        let ids = [
            Chain::Mainnet.fork_id(),
            Chain::Holesky.fork_id(),
            Chain::Sepolia.fork_id(),
        ];
        assert_ne!(ids[0].hash, ids[1].hash);
        assert_ne!(ids[0].hash, ids[2].hash);
        assert_ne!(ids[1].hash, ids[2].hash);
        assert!(ids.iter().all(|id| id.next == 0));
    }

    #[test]
    fn chain_parse_roundtrip() {
        for chain in [Chain::Mainnet, Chain::Holesky, Chain::Sepolia] {
            assert_eq!(chain.to_string().parse::<Chain>().unwrap(), chain);
        }
        assert!("ropsten".parse::<Chain>().is_err());
    }

    #[test]
    fn activations_are_sorted_by_epoch_kind() {
        for chain in [Chain::Mainnet, Chain::Holesky, Chain::Sepolia] {
            let points = chain.fork_activations();
            // Block numbers first, timestamps after; each group ascending.
            let mut blocks: Vec<_> = points.iter().filter(|p| **p < 1_000_000_000).collect();
            blocks.dedup();
            assert!(blocks.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
