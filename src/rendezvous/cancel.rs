use std::sync::Arc;

use tokio::sync::watch;

/// Cooperative cancellation shared between a caller and a running rendezvous
/// or wait. Clones observe the same signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        let changed = receiver.wait_for(|cancelled| *cancelled).await.map(|_| ());
        if changed.is_err() {
            // The sender lives as long as `self`, so this never settles.
            std::future::pending::<()>().await;
        }
    }
}
