//! ethrelayd configuration: a TOML file merged with command-line
//! arguments, arguments winning.

mod args;

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    process::exit,
};

use clap::Parser;
use ethereum_types::H256;
use serde::{Deserialize, Serialize};

use ethrelay_p2p_core::{NodeRecord, RecordError};
use ethrelay_wire::{BlockRange, Chain, OnionAddr};

pub use args::Args;

/// The top-level config.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Chain preset: mainnet, holesky or sepolia.
    pub chain: String,
    /// Numeric network id override for the Status handshake.
    pub network_id: Option<u64>,
    /// Path of the node key file; generated when missing.
    pub keyfile: Option<PathBuf>,

    pub p2p: P2pConfig,
    pub tor: TorConfig,
    pub status: StatusConfig,
    pub tracing: TracingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: Chain::Mainnet.to_string(),
            network_id: None,
            keyfile: None,
            p2p: P2pConfig::default(),
            tor: TorConfig::default(),
            status: StatusConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct P2pConfig {
    /// P2P listening port.
    pub port: u16,
    /// Peer-set upper bound.
    pub max_peers: usize,
    /// enode URLs for initial discovery; empty means the chain defaults.
    pub bootnodes: Vec<String>,
    /// enode URLs to always stay connected to; supports `.onion` hostnames.
    pub static_nodes: Vec<String>,
    /// Discovery protocol toggles.
    pub discv4: bool,
    pub discv5: bool,
    pub no_discover: bool,
    /// Optional snap-protocol DNS list URL, mixed in without the eth filter.
    pub snap_dns: Option<String>,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            port: ethrelay_p2p_core::constants::DEFAULT_P2P_PORT,
            max_peers: ethrelay_p2p::constants::DEFAULT_MAX_PEERS,
            bootnodes: Vec::new(),
            static_nodes: Vec::new(),
            discv4: true,
            discv5: true,
            no_discover: false,
            snap_dns: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct TorConfig {
    /// SOCKS5 address of an external Tor daemon; enables the Tor dialer.
    pub proxy: Option<SocketAddr>,
    /// Prefer `.onion` over clearnet for dual-stack peers.
    pub prefer_tor: bool,
    /// Reject clearnet-only peers and disable clearnet fallback.
    /// Requires `proxy`.
    pub only_onion: bool,
    /// Our own hidden-service address to advertise in the node record.
    pub onion: Option<String>,
    /// Read the advertised address from a Tor hidden-service `hostname`
    /// file instead.
    pub hostname_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct StatusConfig {
    /// Block-range values advertised in the Status handshake. With no
    /// latest hash configured, the genesis hash is advertised.
    pub earliest_block: u64,
    pub latest_block: u64,
    pub latest_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct TracingConfig {
    /// Log filter directive for stdout, e.g. "info" or "ethrelay_p2p=debug".
    pub level: String,
    /// Also log to this file (without ANSI colors) when set.
    pub log_file: Option<PathBuf>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("only-onion requires a tor-proxy address")]
    OnlyOnionRequiresProxy,
    #[error("unknown chain preset: {0}")]
    UnknownChain(String),
    #[error("invalid node url {url}: {source}")]
    InvalidNodeUrl { url: String, source: RecordError },
    #[error("invalid latest-hash: {0}")]
    InvalidLatestHash(String),
    #[error("invalid onion address: {0}")]
    InvalidOnion(String),
    #[error("cannot read config file {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

impl Config {
    /// Reads the config file (if any), applies the args on top and
    /// validates the result.
    ///
    /// Exits with code 1 and a single descriptive sentence on any failure.
    pub fn read_config_and_args() -> Self {
        let args = Args::parse();
        args.do_quick_requests();

        let config = match args.config_file.as_ref() {
            Some(path) => match Self::read_toml(path) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{e}");
                    exit(1);
                }
            },
            None => Self::default(),
        };

        let config = args.apply_args(config);
        if let Err(e) = config.validate() {
            eprintln!("invalid configuration: {e}");
            exit(1);
        }

        config
    }

    fn read_toml(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// The default config rendered as TOML, for `--generate-config`.
    pub fn example_toml() -> String {
        toml::to_string_pretty(&Self::default())
            .expect("the default config always serializes")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chain()?;
        self.block_range(Chain::Mainnet)?;

        if self.tor.only_onion && self.tor.proxy.is_none() {
            return Err(ConfigError::OnlyOnionRequiresProxy);
        }

        if let Some(onion) = &self.tor.onion {
            OnionAddr::check_addr(onion)
                .map_err(|e| ConfigError::InvalidOnion(e.to_string()))?;
        }

        for url in self.p2p.bootnodes.iter().chain(&self.p2p.static_nodes) {
            NodeRecord::from_enode_url(url).map_err(|source| ConfigError::InvalidNodeUrl {
                url: url.clone(),
                source,
            })?;
        }

        Ok(())
    }

    pub fn chain(&self) -> Result<Chain, ConfigError> {
        self.chain
            .parse()
            .map_err(|_| ConfigError::UnknownChain(self.chain.clone()))
    }

    /// The advertised block range; an unset latest hash falls back to the
    /// genesis hash via [`ethrelay_wire::StatusMessage::local`].
    pub fn block_range(&self, chain: Chain) -> Result<BlockRange, ConfigError> {
        let latest_hash = match &self.status.latest_hash {
            None => H256::zero(),
            Some(hex_hash) => {
                let bytes = hex::decode(hex_hash.trim_start_matches("0x"))
                    .map_err(|_| ConfigError::InvalidLatestHash(hex_hash.clone()))?;
                let bytes: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| ConfigError::InvalidLatestHash(hex_hash.clone()))?;
                H256(bytes)
            }
        };

        let mut range = BlockRange {
            earliest: self.status.earliest_block,
            latest: self.status.latest_block,
            latest_hash,
        };
        if range.latest_hash.is_zero() {
            range.latest_hash = chain.genesis_hash();
        }
        Ok(range)
    }

    /// Bootnode records, defaulting to the chain preset's list.
    pub fn bootnode_records(&self, chain: Chain) -> Result<Vec<NodeRecord>, ConfigError> {
        let urls: Vec<String> = if self.p2p.bootnodes.is_empty() {
            chain.bootnodes().iter().map(|s| (*s).to_string()).collect()
        } else {
            self.p2p.bootnodes.clone()
        };
        Self::parse_node_urls(&urls)
    }

    pub fn static_node_records(&self) -> Result<Vec<NodeRecord>, ConfigError> {
        Self::parse_node_urls(&self.p2p.static_nodes)
    }

    fn parse_node_urls(urls: &[String]) -> Result<Vec<NodeRecord>, ConfigError> {
        urls.iter()
            .map(|url| {
                NodeRecord::from_enode_url(url).map_err(|source| ConfigError::InvalidNodeUrl {
                    url: url.clone(),
                    source,
                })
            })
            .collect()
    }

    /// The hidden-service address to advertise, from the config value or
    /// the hostname file.
    pub fn onion_address(&self) -> Result<Option<String>, ConfigError> {
        if let Some(onion) = &self.tor.onion {
            return Ok(Some(onion.clone()));
        }
        let Some(path) = &self.tor.hostname_file else {
            return Ok(None);
        };
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(raw.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Args, Config, ConfigError};

    #[test]
    fn default_config_is_valid_and_serializes() {
        let config = Config::default();
        config.validate().unwrap();

        let rendered = Config::example_toml();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn only_onion_requires_a_proxy() {
        let mut config = Config::default();
        config.tor.only_onion = true;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::OnlyOnionRequiresProxy)
        ));

        config.tor.proxy = Some("127.0.0.1:9050".parse().unwrap());
        config.validate().unwrap();
    }

    #[test]
    fn unknown_chain_is_rejected() {
        let mut config = Config::default();
        config.chain = "ropsten".to_string();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownChain(_))
        ));
    }

    #[test]
    fn malformed_node_urls_are_rejected() {
        let mut config = Config::default();
        config.p2p.static_nodes = vec!["enode://nope".to_string()];

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNodeUrl { .. })
        ));
    }

    #[test]
    fn malformed_latest_hash_is_rejected() {
        let mut config = Config::default();
        config.status.latest_hash = Some("0xnothex".to_string());

        assert!(config.validate().is_err());
    }

    #[test]
    fn args_override_the_file() {
        let args = Args::parse_from([
            "ethrelayd",
            "--chain",
            "sepolia",
            "--maxpeers",
            "5",
            "--prefer-tor",
            "--tor-proxy",
            "127.0.0.1:9050",
        ]);

        let config = args.apply_args(Config::default());
        assert_eq!(config.chain, "sepolia");
        assert_eq!(config.p2p.max_peers, 5);
        assert!(config.tor.prefer_tor);
        assert_eq!(config.tor.proxy, Some("127.0.0.1:9050".parse().unwrap()));
        config.validate().unwrap();
    }

    #[test]
    fn invalid_onion_value_is_rejected() {
        let mut config = Config::default();
        config.tor.onion = Some("tooshort.onion".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOnion(_))
        ));
    }
}
