use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::types::RoundId;

/// One-shot phase timer bound to the round it was armed for.
///
/// The callback must re-check under the engine lock that the phase and round
/// it was armed for are still current: an abort can lose the race against a
/// timer that already fired and is waiting on the lock.
#[derive(Debug)]
pub struct PhaseTimer {
    round_id: RoundId,
    handle: JoinHandle<()>,
}

impl PhaseTimer {
    pub fn spawn<F>(round_id: RoundId, delay: Duration, callback: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback.await;
        });
        Self { round_id, handle }
    }

    pub fn round_id(&self) -> &str {
        &self.round_id
    }

    /// Stop the timer if it hasn't fired yet
    pub fn cancel(self) {
        tracing::debug!("Cancelling phase timer for round {}", self.round_id);
        self.handle.abort();
    }

    /// Forget the handle without aborting. Used by the timer task itself so
    /// it doesn't abort its own transition halfway through.
    pub fn detach(self) {
        drop(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let timer = PhaseTimer::spawn("r1".to_string(), Duration::from_secs(5), async move {
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(timer.round_id(), "r1");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let timer = PhaseTimer::spawn("r1".to_string(), Duration::from_secs(5), async move {
            flag.store(true, Ordering::SeqCst);
        });
        timer.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_timer_still_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let timer = PhaseTimer::spawn("r1".to_string(), Duration::from_secs(1), async move {
            flag.store(true, Ordering::SeqCst);
        });
        timer.detach();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }
}
