//! Token-bucket admission control for outbound requests.
//!
//! The bucket is a semaphore whose permits are tokens. Acquiring a token
//! forgets the permit; a background task puts back every token that has
//! come due since the last refill, never above capacity.

use crate::error::WordTallyError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shortest wait between refill passes. Faster rates are served by adding
/// several tokens per pass.
const MIN_REFILL_TICK: Duration = Duration::from_millis(1);

/// Token bucket shared by every fetch worker.
///
/// The bucket starts full. Dropping the limiter stops the refill task.
#[derive(Debug)]
pub struct RateLimiter {
    tokens: Arc<Semaphore>,
    capacity: usize,
    refill_every: Duration,
    shutdown: CancellationToken,
}

impl RateLimiter {
    /// Create a limiter admitting `requests_per_interval` requests per
    /// `interval`, with a burst capacity of the same size.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(requests_per_interval: u32, interval: Duration) -> Self {
        Self::with_capacity(
            requests_per_interval as usize,
            requests_per_interval,
            interval,
        )
    }

    /// Create a limiter with a burst capacity independent of the rate.
    ///
    /// A capacity or rate of 0 is treated as 1. A zero `interval` makes
    /// every token due at once, so the bucket is topped up on each refill
    /// pass. Refill passes run at most once per millisecond, which caps a
    /// bucket at `capacity` tokens per millisecond.
    pub fn with_capacity(capacity: usize, refill_per_interval: u32, interval: Duration) -> Self {
        let capacity = capacity.max(1);
        let refill_every = (interval / refill_per_interval.max(1)).max(Duration::from_nanos(1));
        let tokens = Arc::new(Semaphore::new(capacity));
        let shutdown = CancellationToken::new();

        tokio::spawn(refill(
            Arc::clone(&tokens),
            capacity,
            refill_every,
            shutdown.clone(),
        ));

        Self {
            tokens,
            capacity,
            refill_every,
            shutdown,
        }
    }

    /// Wait for a token.
    ///
    /// Returns `Cancelled` if `cancel` fires first, in which case no
    /// token is consumed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), WordTallyError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WordTallyError::cancelled("rate limiter token acquisition")),
            permit = self.tokens.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    Ok(())
                }
                Err(_) => Err(WordTallyError::internal("rate limiter bucket closed")),
            },
        }
    }

    /// Tokens currently in the bucket.
    pub fn available(&self) -> usize {
        self.tokens.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Time for one token to come due.
    pub fn refill_every(&self) -> Duration {
        self.refill_every
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn refill(
    tokens: Arc<Semaphore>,
    capacity: usize,
    every: Duration,
    shutdown: CancellationToken,
) {
    let tick = every.max(MIN_REFILL_TICK);
    let mut last_refill = Instant::now();
    let mut ticker = interval_at(last_refill + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let now = Instant::now();
                let due = now.duration_since(last_refill).as_nanos() / every.as_nanos();
                if due == 0 {
                    continue;
                }

                // Only this task adds permits, so the room cannot shrink below what is added.
                let room = capacity.saturating_sub(tokens.available_permits());
                let added = due.min(room as u128) as usize;
                if added > 0 {
                    tokens.add_permits(added);
                }

                if added == room {
                    // Full: tokens past capacity are dropped, not banked.
                    last_refill = now;
                } else {
                    last_refill += Duration::from_nanos((every.as_nanos() * due) as u64);
                }
            }
        }
    }

    debug!("rate limiter refill stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, assert_ready_ok, task};

    #[tokio::test(start_paused = true)]
    async fn test_bucket_starts_full() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let cancel = CancellationToken::new();

        assert_eq!(limiter.available(), 3);
        for _ in 0..3 {
            limiter.acquire(&cancel).await.unwrap();
        }
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_bucket_blocks_until_refill() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();

        let mut waiting = task::spawn(limiter.acquire(&cancel));
        assert_pending!(waiting.poll());

        tokio::time::sleep(Duration::from_millis(501)).await;
        assert!(waiting.is_woken());
        assert_ready_ok!(waiting.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_waits_one_tick() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();

        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_never_exceeds_capacity() {
        let limiter = RateLimiter::new(4, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(limiter.available(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_consumes_no_token() {
        let limiter = RateLimiter::with_capacity(1, 1, Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let mut waiting = task::spawn(limiter.acquire(&cancel));
        assert_pending!(waiting.poll());
        cancel.cancel();

        let result = assert_ready!(waiting.poll());
        assert!(matches!(result, Err(e) if e.is_cancelled()));
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_leaves_bucket_alone() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(limiter.acquire(&cancel).await.is_err());
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test]
    async fn test_refill_period() {
        let limiter = RateLimiter::new(100, Duration::from_secs(1));
        assert_eq!(limiter.refill_every(), Duration::from_millis(10));
        assert_eq!(limiter.capacity(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_refill_adds_every_due_token() {
        let limiter = RateLimiter::new(4, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        for _ in 0..4 {
            limiter.acquire(&cancel).await.unwrap();
        }

        // Three tokens come due by 750ms, one every 250ms.
        tokio::time::sleep(Duration::from_millis(760)).await;
        assert_eq!(limiter.available(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_settings_are_clamped() {
        let limiter = RateLimiter::with_capacity(0, 0, Duration::ZERO);
        let cancel = CancellationToken::new();
        assert_eq!(limiter.capacity(), 1);
        assert!(limiter.refill_every() > Duration::ZERO);

        limiter.acquire(&cancel).await.unwrap();
        assert_eq!(limiter.available(), 0);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sustains_rates_above_timer_resolution() {
        let limiter = RateLimiter::new(5000, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        for _ in 0..5000 {
            limiter.acquire(&cancel).await.unwrap();
        }

        let window = Duration::from_millis(500);
        let start = std::time::Instant::now();
        let mut acquired = 0u32;
        while start.elapsed() < window {
            let wait = window.saturating_sub(start.elapsed());
            match tokio::time::timeout(wait, limiter.acquire(&cancel)).await {
                Ok(result) => {
                    result.unwrap();
                    acquired += 1;
                }
                Err(_) => break,
            }
        }

        // 2500 tokens come due in the window.
        assert!(acquired > 2000, "only {} tokens in 500ms at 5000/s", acquired);
        assert!(acquired < 3500, "{} tokens in 500ms at 5000/s", acquired);
    }
}
