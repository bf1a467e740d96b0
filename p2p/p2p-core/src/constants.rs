use std::time::Duration;

/// The timeout on a single outbound wire write, so a stalled peer socket
/// cannot wedge a router worker forever.
pub const SENDING_TIMEOUT: Duration = Duration::from_secs(20);

/// The default TCP port of the eth protocol, used when a record carries no
/// `tcp` entry.
pub const DEFAULT_P2P_PORT: u16 = 30303;

/// The maximum encoded size of a node record.
pub const MAX_RECORD_SIZE: usize = 300;
