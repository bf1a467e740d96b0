use std::time::Duration;

/// Capacity of each per-source ordered queue. Enqueues block when a queue is
/// full, pushing backpressure from slow destinations back onto the router.
pub(crate) const ORDERED_QUEUE_CAPACITY: usize = 100;

/// Capacity of the engine's inbound queue.
pub(crate) const INBOUND_QUEUE_CAPACITY: usize = 1024;

/// Capacity of a peer's writer queue.
pub(crate) const PEER_WRITE_QUEUE_CAPACITY: usize = 64;

/// How long a proxied request may wait for its response.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the proxy sweeps expired pending requests.
pub(crate) const PENDING_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// The timeout on the eth Status exchange during attachment.
pub(crate) const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How often static nodes are re-offered to the dial scheduler while
/// disconnected.
pub(crate) const STATIC_REDIAL_INTERVAL: Duration = Duration::from_secs(30);

/// Parallelism of asynchronous record resolution on the discv4 walk.
pub(crate) const ENR_RESOLVE_CONCURRENCY: usize = 16;

/// Prefetch depth applied to random-walk discovery sources.
pub(crate) const DISCOVERY_PREFETCH: usize = 32;

/// Concurrent outbound dial attempts.
pub(crate) const DIAL_CONCURRENCY: usize = 16;

/// Default peer-set upper bound.
pub const DEFAULT_MAX_PEERS: usize = 200;
