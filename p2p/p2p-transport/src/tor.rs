//! Tor-aware dialer.
//!
//! Routes `.onion` peers through an external Tor daemon's SOCKS5 port using
//! the domain-address form, so onion hostnames never touch DNS. Clearnet
//! fallback is governed by the configured mode:
//!
//! - default: Tor only for onion-only records,
//! - `prefer_tor`: Tor wins for dual-stack records, clearnet on failure,
//! - `only_onion`: clearnet-only candidates are rejected outright and no
//!   fallback is ever attempted.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::timeout,
};
use tokio_socks::tcp::Socks5Stream;
use tokio_util::codec::{FramedRead, FramedWrite};

use ethrelay_p2p_core::{constants::DEFAULT_P2P_PORT, DialError, NodeRecord, Transport};
use ethrelay_wire::{EnvelopeCodec, OnionAddr};

/// The dial timeout applied when the caller supplies no deadline.
const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-selection configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TorDialerConfig {
    /// SOCKS5 address of the external Tor daemon. Without one the dialer is
    /// clearnet-only. `only_onion` requires it; the configuration layer
    /// enforces that before a dialer is ever built.
    pub socks_addr: Option<SocketAddr>,
    /// Prefer the onion endpoint for dual-stack records.
    pub prefer_tor: bool,
    /// Reject candidates without an onion endpoint and never fall back.
    pub only_onion: bool,
}

/// Counters for Tor dial attempts.
#[derive(Debug, Default)]
pub struct DialMetrics {
    tor_dials_total: AtomicU64,
    tor_dials_success: AtomicU64,
}

impl DialMetrics {
    pub fn tor_dials_total(&self) -> u64 {
        self.tor_dials_total.load(Ordering::Relaxed)
    }

    pub fn tor_dials_success(&self) -> u64 {
        self.tor_dials_success.load(Ordering::Relaxed)
    }
}

/// The Tor-aware dialer.
///
/// Performs no retries of its own; the dial scheduler decides whether a
/// failed candidate is attempted again. The only in-dialer fallback is
/// Tor to clearnet, when the mode and the record allow it.
#[derive(Debug, Clone)]
pub struct TorDialer {
    config: TorDialerConfig,
    metrics: Arc<DialMetrics>,
}

impl TorDialer {
    pub fn new(config: TorDialerConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(DialMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<DialMetrics> {
        Arc::clone(&self.metrics)
    }

    /// The onion host of a record: the `onion3` entry, or a hostname with
    /// an `.onion` suffix.
    fn onion_host(record: &NodeRecord) -> Option<String> {
        if let Some(onion) = record.onion3() {
            return Some(onion.to_string());
        }
        record
            .hostname()
            .filter(|host| OnionAddr::is_onion_hostname(host))
            .map(str::to_ascii_lowercase)
    }

    /// Establishes a raw TCP stream to the record's chosen transport.
    pub async fn dial(
        &self,
        record: &NodeRecord,
        deadline: Option<Duration>,
    ) -> Result<TcpStream, DialError> {
        let onion_host = Self::onion_host(record);
        let clearnet_addr = record.tcp_addr();
        let timeout_dur = deadline.unwrap_or(DEFAULT_DIAL_TIMEOUT);

        let Some(onion_host) = onion_host else {
            if self.config.only_onion {
                return Err(DialError::OnlyOnionNoOnion);
            }
            return Self::dial_clearnet(clearnet_addr, timeout_dur).await;
        };

        if let Some(socks_addr) = self.config.socks_addr {
            let use_tor =
                self.config.prefer_tor || self.config.only_onion || clearnet_addr.is_none();
            if use_tor {
                let port = record.tcp_port().unwrap_or(DEFAULT_P2P_PORT);
                match self
                    .dial_socks5(socks_addr, &onion_host, port, timeout_dur)
                    .await
                {
                    Ok(stream) => return Ok(stream),
                    Err(err) if self.config.only_onion => {
                        return Err(DialError::TorFailedNoFallback(err));
                    }
                    Err(err) => {
                        if clearnet_addr.is_none() {
                            return Err(DialError::TorFailedNoClearnet(err));
                        }
                        tracing::debug!("tor dial of {onion_host} failed ({err}), trying clearnet");
                    }
                }
            }
        }

        Self::dial_clearnet(clearnet_addr, timeout_dur).await
    }

    async fn dial_socks5(
        &self,
        socks_addr: SocketAddr,
        onion_host: &str,
        port: u16,
        timeout_dur: Duration,
    ) -> Result<TcpStream, std::io::Error> {
        self.metrics.tor_dials_total.fetch_add(1, Ordering::Relaxed);

        // The domain-address form keeps `.onion` resolution inside Tor.
        let target = format!("{onion_host}:{port}");
        let stream = timeout(timeout_dur, Socks5Stream::connect(socks_addr, target))
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "socks5 dial timed out")
            })?
            .map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::ConnectionAborted, e.to_string())
            })?;

        self.metrics
            .tor_dials_success
            .fetch_add(1, Ordering::Relaxed);
        Ok(stream.into_inner())
    }

    async fn dial_clearnet(
        addr: Option<SocketAddr>,
        timeout_dur: Duration,
    ) -> Result<TcpStream, DialError> {
        let addr = addr.ok_or(DialError::NoEndpoint)?;
        let stream = timeout(timeout_dur, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                DialError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "tcp dial timed out",
                ))
            })??;
        Ok(stream)
    }
}

/// [`Transport`] impl wrapping the raw dial in envelope framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TorTransport;

#[async_trait::async_trait]
impl Transport for TorTransport {
    type Stream = FramedRead<OwnedReadHalf, EnvelopeCodec>;
    type Sink = FramedWrite<OwnedWriteHalf, EnvelopeCodec>;
    type ClientConfig = TorDialer;

    async fn connect_to_peer(
        record: &NodeRecord,
        dialer: &Self::ClientConfig,
    ) -> Result<(Self::Stream, Self::Sink), DialError> {
        let stream = dialer.dial(record, None).await?;
        let (read, write) = stream.into_split();
        Ok((
            FramedRead::new(read, EnvelopeCodec::default()),
            FramedWrite::new(write, EnvelopeCodec::default()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use ethrelay_p2p_core::{DialError, NodeIdentity, NodeRecord};

    use super::{TorDialer, TorDialerConfig};

    const ONION: &str = "2gzyxa5ihm7nsggfxnu52rck2vv4rvmdlkiu3zzui5du4xyclen53wid.onion";

    fn dialer(prefer_tor: bool, only_onion: bool) -> TorDialer {
        TorDialer::new(TorDialerConfig {
            // Nothing listens here; tests only exercise the gate logic.
            socks_addr: Some(SocketAddr::from((Ipv4Addr::LOCALHOST, 1))),
            prefer_tor,
            only_onion,
        })
    }

    fn clearnet_only_record() -> NodeRecord {
        let identity = NodeIdentity::generate();
        let mut record = NodeRecord::new(&identity);
        record.set_ip4(Ipv4Addr::new(127, 0, 0, 1), &identity);
        record.set_tcp_port(1, &identity);
        record
    }

    fn onion_only_record() -> NodeRecord {
        let identity = NodeIdentity::generate();
        let mut record = NodeRecord::new(&identity);
        record.set_onion3(ONION, &identity).unwrap();
        record
    }

    #[tokio::test]
    async fn only_onion_rejects_clearnet_only_candidates() {
        let dialer = dialer(false, true);
        let err = dialer.dial(&clearnet_only_record(), None).await.unwrap_err();

        assert!(matches!(err, DialError::OnlyOnionNoOnion));
        // No SOCKS5 attempt was made.
        assert_eq!(dialer.metrics().tor_dials_total(), 0);
    }

    #[tokio::test]
    async fn only_onion_failure_has_no_fallback() {
        let dialer = dialer(false, true);
        let err = dialer.dial(&onion_only_record(), None).await.unwrap_err();

        assert!(matches!(err, DialError::TorFailedNoFallback(_)));
        assert_eq!(dialer.metrics().tor_dials_total(), 1);
        assert_eq!(dialer.metrics().tor_dials_success(), 0);
    }

    #[tokio::test]
    async fn onion_only_record_without_clearnet_reports_no_clearnet() {
        let dialer = dialer(false, false);
        let err = dialer.dial(&onion_only_record(), None).await.unwrap_err();

        assert!(matches!(err, DialError::TorFailedNoClearnet(_)));
    }

    #[tokio::test]
    async fn prefer_tor_attempts_socks_before_clearnet() {
        let dialer = dialer(true, false);

        let identity = NodeIdentity::generate();
        let mut record = NodeRecord::new(&identity);
        record.set_ip4(Ipv4Addr::new(127, 0, 0, 1), &identity);
        record.set_tcp_port(1, &identity);
        record.set_onion3(ONION, &identity).unwrap();

        // Both paths fail (nothing is listening). The SOCKS5 attempt must
        // be recorded, proving Tor won the selection, and the final error
        // comes from the clearnet fallback.
        let err = dialer.dial(&record, None).await.unwrap_err();
        assert_eq!(dialer.metrics().tor_dials_total(), 1);
        assert!(matches!(err, DialError::Io(_)));
    }

    #[tokio::test]
    async fn default_mode_dials_dual_stack_over_clearnet() {
        let dialer = dialer(false, false);

        let identity = NodeIdentity::generate();
        let mut record = NodeRecord::new(&identity);
        record.set_ip4(Ipv4Addr::new(127, 0, 0, 1), &identity);
        record.set_tcp_port(1, &identity);
        record.set_onion3(ONION, &identity).unwrap();

        let _ = dialer.dial(&record, None).await;
        assert_eq!(dialer.metrics().tor_dials_total(), 0);
    }

    #[tokio::test]
    async fn without_a_proxy_the_dialer_is_clearnet_only() {
        let dialer = TorDialer::new(TorDialerConfig::default());

        // An onion-only record is unreachable without a proxy.
        let err = dialer.dial(&onion_only_record(), None).await.unwrap_err();
        assert!(matches!(err, DialError::NoEndpoint));
        assert_eq!(dialer.metrics().tor_dials_total(), 0);
    }

    #[tokio::test]
    async fn onion_hostname_from_enode_url_selects_tor() {
        let identity = NodeIdentity::generate();
        let pubkey = identity.public_key().serialize_uncompressed();
        let url = format!("enode://{}@{ONION}:30303", hex::encode(&pubkey[1..]));
        let record = NodeRecord::from_enode_url(&url).unwrap();

        let dialer = dialer(false, false);
        let err = dialer.dial(&record, None).await.unwrap_err();

        // The hostname routed through SOCKS5, not DNS or TCP.
        assert!(matches!(err, DialError::TorFailedNoClearnet(_)));
        assert_eq!(dialer.metrics().tor_dials_total(), 1);
    }
}
