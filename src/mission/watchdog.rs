use crate::warn;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Phase deadline. Expiry only raises a flag; the orchestrator applies it to the mission
/// state at its next check, an ongoing receive is never interrupted.
#[derive(Default)]
pub struct Watchdog {
    expired: CancellationToken,
    timer: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn new() -> Self { Self::default() }

    /// (Re)arms the watchdog, dropping a previous deadline.
    pub fn arm(&mut self, label: String, bound: Duration) {
        self.disarm();
        let expired = CancellationToken::new();
        self.expired = expired.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(bound).await;
            warn!("Watchdog for {label} expired after {}s", bound.as_secs());
            expired.cancel();
        }));
    }

    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.expired = CancellationToken::new();
    }

    pub fn expired(&self) -> bool { self.expired.is_cancelled() }
}

impl Drop for Watchdog {
    fn drop(&mut self) { self.disarm(); }
}
