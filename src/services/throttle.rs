//! Process-wide gate in front of the AI provider.
//!
//! Every piece of work that talks to the AI (queued analyses, on-demand
//! analyses, multiples) runs inside [`AiGate::exclusive`]: one at a time, in
//! arrival order, each followed by the fixed cooldown before the next one is
//! let through.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

pub struct AiGate {
    turn: Mutex<()>,
    cooldown: Duration,
}

impl AiGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            turn: Mutex::new(()),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Run `work` while holding the only turn, then keep holding it for the cooldown.
    pub async fn exclusive<F: Future>(&self, work: F) -> F::Output {
        let _turn = self.turn.lock().await;
        let output = work.await;
        if !self.cooldown.is_zero() {
            tracing::debug!("Cooling down for {:?} before the next AI request", self.cooldown);
            tokio::time::sleep(self.cooldown).await;
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_work_never_overlaps_and_cools_down() {
        let gate = Arc::new(AiGate::new(Duration::from_secs(30)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let job = |n: u32| {
            let gate = gate.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                gate.exclusive(async {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    n
                })
                .await
            }
        };

        let (a, b, c) = tokio::join!(job(1), job(2), job(3));
        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        // Three 5s jobs, each followed by a 30s cooldown.
        assert!(start.elapsed() >= Duration::from_secs(105));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_cooldown_returns_immediately() {
        let gate = AiGate::new(Duration::ZERO);
        let start = Instant::now();
        assert_eq!(gate.exclusive(async { 7 }).await, 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
