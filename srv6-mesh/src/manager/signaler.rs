use tokio::sync::Notify;

/// Zero-payload, level-triggered notification towards the BGP control plane.
pub trait BgpSignaler: Send + Sync {
    fn event(&self);
}

/// Coalescing signaler: any number of kicks between two `changed` calls
/// collapse into one wakeup.
#[derive(Default)]
pub struct Signaler {
    notify: Notify,
}

impl Signaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until at least one event was emitted since the last call.
    pub async fn changed(&self) {
        self.notify.notified().await
    }
}

impl BgpSignaler for Signaler {
    fn event(&self) {
        self.notify.notify_one();
    }
}
