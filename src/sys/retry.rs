// src/sys/retry.rs

use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Outcome of a bounded poll.
#[derive(Debug)]
pub enum PollOutcome<T> {
    Found(T),
    TimedOut,
}

impl<T> PollOutcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            PollOutcome::Found(v) => Some(v),
            PollOutcome::TimedOut => None,
        }
    }
}

/// Re-runs `probe` on a fixed interval until it yields a value or the total
/// budget is exhausted. The first probe fires immediately, so a condition
/// that already holds never sleeps. The final probe lands on the budget
/// boundary itself; the outcome is therefore decided within one interval of
/// the nominal timeout, never earlier.
pub async fn poll_until<F, Fut, T>(timeout: Duration, interval: Duration, mut probe: F) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let started = Instant::now();
    loop {
        if let Some(hit) = probe().await {
            return PollOutcome::Found(hit);
        }
        if started.elapsed() + interval > timeout {
            return PollOutcome::TimedOut;
        }
        sleep(interval).await;
    }
}
