//! Node assembly.
//!
//! Builds the local identity and record, seeds the record's `eth` (and
//! optional `onion3`) entries, composes the discovery mix, and runs the
//! relay engine plus the dial scheduler until a shutdown signal.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use ethrelay_p2p::{
    discovery::{eth_node_filter, prefetch, DiscoveryMix, NodeStream},
    initialize_relay,
    static_nodes::static_nodes_stream,
    Connector, DialScheduler, RoundRobin,
};
use ethrelay_p2p_core::{NodeIdentity, NodeRecord};
use ethrelay_p2p_transport::{TorDialer, TorDialerConfig, TorTransport};
use ethrelay_wire::{ForkId, StatusMessage};

use crate::config::Config;

/// How often the node logs a peer-info line.
const INFO_INTERVAL: Duration = Duration::from_secs(30);

/// Candidate streams from the lower discovery stack (discv4/discv5 walks,
/// DNS list iterators). Each eth source is wrapped by the fork-id filter
/// before it joins the mix; a snap source joins unfiltered.
#[derive(Default)]
pub struct DiscoverySources {
    pub discv4: Option<NodeStream>,
    pub discv5: Option<NodeStream>,
    pub dns: Option<NodeStream>,
    pub snap_dns: Option<NodeStream>,
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    run_with_sources(config, DiscoverySources::default()).await
}

pub async fn run_with_sources(
    config: Config,
    sources: DiscoverySources,
) -> anyhow::Result<()> {
    let chain = config.chain()?;
    let network_id = config.network_id.unwrap_or_else(|| chain.network_id());
    let fork_id = chain.fork_id();

    let identity = match &config.keyfile {
        Some(path) => NodeIdentity::load_or_generate(path).context("loading node key")?,
        None => NodeIdentity::generate(),
    };
    tracing::info!(
        "starting ethrelay on {chain} (network id {network_id}), node id {}",
        hex::encode(identity.node_id().as_bytes())
    );

    let record = build_record(&config, &identity, fork_id)?;
    tracing::debug!(
        "local record (seq {}): {}",
        record.seq(),
        hex::encode(record.encode().context("encoding the local record")?)
    );

    let status = StatusMessage::local(chain, network_id, fork_id, config.block_range(chain)?);

    let (relay, relay_task) = initialize_relay(Box::new(RoundRobin::new()));

    let dialer = TorDialer::new(TorDialerConfig {
        socks_addr: config.tor.proxy,
        prefer_tor: config.tor.prefer_tor,
        only_onion: config.tor.only_onion,
    });
    if config.tor.proxy.is_some() {
        tracing::info!(
            "tor dialer enabled (prefer_tor: {}, only_onion: {})",
            config.tor.prefer_tor,
            config.tor.only_onion
        );
    }
    let dial_metrics = dialer.metrics();

    let connector =
        Connector::<TorTransport>::new(relay.clone(), identity.node_id(), status, dialer);

    // Compose the discovery mix.
    let mut mix = DiscoveryMix::new();
    if !config.p2p.no_discover {
        let bootnodes = config.bootnode_records(chain)?;
        if !bootnodes.is_empty() {
            mix.add_unfiltered("bootnodes", futures::stream::iter(bootnodes).boxed());
        }

        let filter = eth_node_filter(fork_id);
        if config.p2p.discv4 {
            if let Some(source) = sources.discv4 {
                mix.add_filtered("discv4", prefetch(source), filter.clone());
            }
        }
        if config.p2p.discv5 {
            if let Some(source) = sources.discv5 {
                mix.add_filtered("discv5", prefetch(source), filter.clone());
            }
        }
        if let Some(source) = sources.dns {
            mix.add_filtered("dnsdisc", source, filter);
        }
        if let Some(source) = sources.snap_dns {
            mix.add_unfiltered("dnsdisc-snap", source);
        }
    }

    let statics = config.static_node_records()?;
    if !statics.is_empty() {
        tracing::info!("{} static nodes configured", statics.len());
        mix.add_unfiltered(
            "staticnodes",
            static_nodes_stream(statics, Arc::clone(relay.peer_set())),
        );
    }

    if mix.is_empty() {
        tracing::warn!("no discovery sources configured; the relay will only accept peers");
    }

    let quit = CancellationToken::new();
    let scheduler = DialScheduler::new(
        connector,
        relay.clone(),
        config.p2p.max_peers,
        quit.clone(),
    );
    let scheduler_task = tokio::spawn(scheduler.run(mix.boxed()));

    let mut info_ticker = tokio::time::interval(INFO_INTERVAL);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = &mut shutdown => {
                res?;
                tracing::info!("shutdown signal received");
                break;
            }
            _ = info_ticker.tick() => {
                tracing::info!(
                    "peers: {} / {} | pending requests: {} | tor dials: {} ok / {} total",
                    relay.peer_count(),
                    config.p2p.max_peers,
                    relay.pending_requests(),
                    dial_metrics.tor_dials_success(),
                    dial_metrics.tor_dials_total(),
                );
            }
        }
    }

    quit.cancel();
    let _ = scheduler_task.await;
    relay_task.stop().await;
    Ok(())
}

/// Builds the signed local record: endpoint, `eth` fork id, and the
/// `onion3` entry when a hidden-service address is configured.
fn build_record(
    config: &Config,
    identity: &NodeIdentity,
    fork_id: ForkId,
) -> anyhow::Result<NodeRecord> {
    let mut record = NodeRecord::new(identity);
    record.set_tcp_port(config.p2p.port, identity);
    record.set_fork_id(fork_id, identity);

    if let Some(onion) = config.onion_address()? {
        record
            .set_onion3(&onion, identity)
            .with_context(|| format!("invalid onion3 address {onion}"))?;
        tracing::info!("advertising hidden service {onion}");
    }

    Ok(record)
}

async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("installing SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("waiting for ctrl-c")?,
            _ = sigterm.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("waiting for ctrl-c")
    }
}
