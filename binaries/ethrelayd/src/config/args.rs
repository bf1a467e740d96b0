use std::{net::SocketAddr, path::PathBuf, process::exit};

use crate::config::Config;

/// Ethrelayd args. Every flag overrides its config-file counterpart.
#[derive(clap::Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// The chain preset to relay for: mainnet, holesky or sepolia.
    #[arg(long)]
    pub chain: Option<String>,
    /// Numeric network id override for the Status handshake.
    #[arg(long)]
    pub network_id: Option<u64>,
    /// P2P listening port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Peer-set upper bound.
    #[arg(long)]
    pub maxpeers: Option<usize>,
    /// Comma-separated enode URLs for initial discovery.
    #[arg(long, value_delimiter = ',')]
    pub bootnodes: Vec<String>,
    /// Comma-separated enode URLs to always stay connected to. Supports
    /// `.onion` hostnames.
    #[arg(long, value_delimiter = ',')]
    pub staticnodes: Vec<String>,
    /// Enable or disable the discv4 walk.
    #[arg(long)]
    pub v4disc: Option<bool>,
    /// Enable or disable the discv5 walk.
    #[arg(long)]
    pub v5disc: Option<bool>,
    /// Disable discovery entirely.
    #[arg(long)]
    pub nodiscover: bool,
    /// SOCKS5 address of a Tor daemon; enables the Tor dialer.
    #[arg(long)]
    pub tor_proxy: Option<SocketAddr>,
    /// Prefer `.onion` over clearnet for dual-stack peers.
    #[arg(long)]
    pub prefer_tor: bool,
    /// Reject clearnet-only peers and disable clearnet fallback.
    /// Requires --tor-proxy.
    #[arg(long)]
    pub only_onion: bool,
    /// Earliest block advertised in the Status handshake.
    #[arg(long)]
    pub earliest_block: Option<u64>,
    /// Latest block advertised in the Status handshake.
    #[arg(long)]
    pub latest_block: Option<u64>,
    /// Hash of the latest block, hex encoded.
    #[arg(long)]
    pub latest_hash: Option<String>,
    /// Path of the node key file; generated when missing.
    #[arg(long)]
    pub keyfile: Option<PathBuf>,
    /// The PATH of the `ethrelayd` config file.
    #[arg(long)]
    pub config_file: Option<PathBuf>,
    /// Generate a config file and print it to stdout.
    #[arg(long)]
    pub generate_config: bool,
}

impl Args {
    /// Complete any quick requests asked for in [`Args`].
    ///
    /// May cause the process to [`exit`].
    pub fn do_quick_requests(&self) {
        if self.generate_config {
            println!("{}", Config::example_toml());
            exit(0);
        }
    }

    /// Applies the [`Args`] on top of the given [`Config`].
    pub fn apply_args(&self, mut config: Config) -> Config {
        if let Some(chain) = &self.chain {
            config.chain.clone_from(chain);
        }
        if let Some(network_id) = self.network_id {
            config.network_id = Some(network_id);
        }
        if let Some(port) = self.port {
            config.p2p.port = port;
        }
        if let Some(maxpeers) = self.maxpeers {
            config.p2p.max_peers = maxpeers;
        }
        if !self.bootnodes.is_empty() {
            config.p2p.bootnodes.clone_from(&self.bootnodes);
        }
        if !self.staticnodes.is_empty() {
            config.p2p.static_nodes.clone_from(&self.staticnodes);
        }
        if let Some(v4disc) = self.v4disc {
            config.p2p.discv4 = v4disc;
        }
        if let Some(v5disc) = self.v5disc {
            config.p2p.discv5 = v5disc;
        }
        if self.nodiscover {
            config.p2p.no_discover = true;
        }
        if let Some(proxy) = self.tor_proxy {
            config.tor.proxy = Some(proxy);
        }
        if self.prefer_tor {
            config.tor.prefer_tor = true;
        }
        if self.only_onion {
            config.tor.only_onion = true;
        }
        if let Some(earliest) = self.earliest_block {
            config.status.earliest_block = earliest;
        }
        if let Some(latest) = self.latest_block {
            config.status.latest_block = latest;
        }
        if let Some(hash) = &self.latest_hash {
            config.status.latest_hash = Some(hash.clone());
        }
        if let Some(keyfile) = &self.keyfile {
            config.keyfile = Some(keyfile.clone());
        }

        config
    }
}
