use std::sync::Arc;
use tokio::sync::watch;

/// One-shot kill signal shared between a worker's handle and its watcher
/// task. Triggering is idempotent.
#[derive(Clone)]
pub struct KillSwitch {
    sender: Arc<watch::Sender<bool>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            sender: Arc::new(tx),
        }
    }

    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.subscribe().borrow()
    }

    pub async fn triggered(&self) {
        let mut rx = self.sender.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}
