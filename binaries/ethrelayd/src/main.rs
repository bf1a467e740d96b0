//! ethrelayd: a stateless Ethereum P2P relay node with optional Tor
//! transport.
//!
//! The relay speaks the eth wire protocol without owning any chain state:
//! gossip is fanned out to all other peers in per-source order, and
//! request/response pairs are proxied to peers picked round-robin.

mod config;
mod logging;
mod node;

use std::process::exit;

fn main() {
    let config = config::Config::read_config_and_args();
    logging::init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start the runtime: {e}");
            exit(1);
        }
    };

    if let Err(e) = runtime.block_on(node::run(config)) {
        eprintln!("{e:#}");
        exit(1);
    }
}
