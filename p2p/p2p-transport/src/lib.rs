//! ## P2P Transports
//!
//! Connection establishment for the relay: plain clearnet TCP, and the
//! Tor-aware dialer that routes `.onion` peers through a SOCKS5 proxy with
//! a configurable clearnet fallback policy.

mod tor;

pub use tor::{DialMetrics, TorDialer, TorDialerConfig, TorTransport};
