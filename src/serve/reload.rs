//! Browser reload channel.

use tokio::sync::broadcast;
use tracing::debug;

use crate::engine::runtime::ReloadNotifier;
use crate::types::ReloadKind;

/// Fan-out hub for reload notifications. The engine pushes, every connected
/// SSE client receives. Slow clients that fall behind the channel capacity
/// miss intermediate notifications, which is harmless: the latest reload
/// supersedes anything they missed.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    tx: broadcast::Sender<ReloadKind>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadKind> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadNotifier for ReloadHub {
    fn notify(&self, kind: ReloadKind) {
        // Err just means no browser is connected right now.
        match self.tx.send(kind) {
            Ok(n) => debug!(%kind, clients = n, "reload pushed"),
            Err(_) => debug!(%kind, "reload dropped; no connected clients"),
        }
    }
}
