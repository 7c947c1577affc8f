//! Token bucket rate limiter.
//!
//! One bucket gates every outbound forward, whichever balancer or method it
//! belongs to. Tokens accrue at `rate` per second up to `burst`; a forward
//! attempt spends one. When the bucket is dry, [`RateLimiter::acquire`]
//! suspends the caller until the next token is due.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

struct Bucket {
    tokens: f64,
    updated: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, rate: f64, burst: f64) {
        let accrued = now.duration_since(self.updated).as_secs_f64() * rate;
        self.tokens = (self.tokens + accrued).min(burst);
        self.updated = now;
    }

    /// Spend one token, or report how long until one accrues.
    fn take(&mut self, now: Instant, rate: f64, burst: f64) -> Result<(), Duration> {
        self.refill(now, rate, burst);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        Err(Duration::try_from_secs_f64((1.0 - self.tokens) / rate).unwrap_or(Duration::MAX))
    }
}

/// Process-wide admission gate shared by every provider and method.
///
/// Starts full, so the first `burst` attempts go through without waiting.
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// `rate` tokens per second, at most `burst` banked.
    pub fn per_second(rate: u32, burst: u32) -> Self {
        Self {
            rate: f64::from(rate),
            burst: f64::from(burst),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                updated: Instant::now(),
            }),
        }
    }

    fn take(&self) -> Result<(), Duration> {
        self.bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take(Instant::now(), self.rate, self.burst)
    }

    /// Wait until a token is available, then spend it. Never fails.
    ///
    /// The lock is released before sleeping; after waking the caller races
    /// for the token again.
    pub async fn acquire(&self) {
        while let Err(wait) = self.take() {
            tracing::trace!(wait_ms = wait.as_millis(), "rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Spend a token only if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.take().is_ok()
    }

    /// Whole tokens currently banked.
    pub fn available(&self) -> u32 {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(Instant::now(), self.rate, self.burst);
        bucket.tokens.floor() as u32
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .finish()
    }
}
