use std::sync::Arc;
use tokio::sync::watch;

/// A one-shot signal that may be awaited by any number of tasks.
///
/// Once set, a gate stays set.
#[derive(Clone, Debug)]
pub struct Gate(Arc<watch::Sender<bool>>);

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cancelled")]
pub struct Cancelled(());

// === impl Gate ===

impl Default for Gate {
    fn default() -> Self {
        Self(Arc::new(watch::Sender::new(false)))
    }
}

impl Gate {
    pub fn set(&self) {
        self.0.send_if_modified(|set| !std::mem::replace(set, true));
    }

    pub fn is_set(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits for the gate to be set, or for `drain` to be signaled.
    pub async fn wait(&self, drain: drain::Watch) -> Result<(), Cancelled> {
        let mut rx = self.0.subscribe();
        tokio::select! {
            biased;
            res = rx.wait_for(|set| *set) => res.map(|_| ()).map_err(|_| Cancelled(())),
            _ = drain.signaled() => Err(Cancelled(())),
        }
    }
}
