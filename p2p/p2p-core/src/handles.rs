//! Connection handles.
//!
//! A [`ConnectionGuard`] lives with a peer's I/O tasks and cancels the shared
//! token when they die; the matching [`ConnectionHandle`] lets the rest of
//! the relay observe liveness and request a disconnect.

use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Builds a linked guard/handle pair.
pub fn connection_handles() -> (ConnectionGuard, ConnectionHandle) {
    let token = CancellationToken::new();
    (
        ConnectionGuard {
            token: token.clone(),
        },
        ConnectionHandle { token },
    )
}

/// Held by the connection's I/O tasks.
pub struct ConnectionGuard {
    token: CancellationToken,
}

impl ConnectionGuard {
    /// Resolves when the connection should shut down.
    pub fn should_shutdown(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    /// Tells every [`ConnectionHandle`] that this connection is closed.
    ///
    /// Also called on [`Drop::drop`].
    pub fn connection_closed(&self) {
        self.token.cancel();
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Held by anything that needs to check or end a peer connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    token: CancellationToken,
}

impl ConnectionHandle {
    /// Resolves when the connection closes.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signals the connection's I/O tasks to disconnect.
    pub fn disconnect(&self) {
        self.token.cancel();
    }
}
