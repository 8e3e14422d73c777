//! Token bucket rate limiting, refilled lazily from elapsed time.
//!
//! [`RateLimiter`] adds a per-interval budget on top of the bucket and either
//! answers immediately (`fire_immediately`) or waits until tokens are back.

use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use tokio::time::Instant;
use tracing::trace;

use crate::error::{JwksClientError, result::JwksClientResult};

/// Remaining-token value returned when a fire-immediately request is refused
pub const NO_TOKEN: f64 = -1.0;

struct BucketState {
    content: f64,
    last_refill: Instant,
}

/// A bucket of `bucket_size` tokens refilled by `tokens_per_interval` every `interval`.
///
/// Invariant: `0 <= content <= bucket_size`.
pub struct TokenBucket {
    bucket_size: f64,
    tokens_per_interval: f64,
    interval: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A bucket that starts full
    #[must_use]
    pub fn new(bucket_size: u32, tokens_per_interval: u32, interval: Duration) -> Self {
        Self {
            bucket_size: f64::from(bucket_size),
            tokens_per_interval: f64::from(tokens_per_interval),
            interval,
            state: Mutex::new(BucketState {
                content: f64::from(bucket_size),
                last_refill: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub const fn bucket_size(&self) -> f64 {
        self.bucket_size
    }

    fn lock(&self) -> JwksClientResult<MutexGuard<'_, BucketState>> {
        self.state.lock().map_err(|e| {
            JwksClientError::Default(format!("cannot lock the token bucket. Error: {e:?}"))
        })
    }

    /// Add the tokens accumulated since the last refill
    fn drip(&self, state: &mut BucketState) {
        let now = Instant::now();
        if self.tokens_per_interval <= 0.0 {
            state.content = self.bucket_size;
            state.last_refill = now;
            return;
        }
        let elapsed = now.saturating_duration_since(state.last_refill);
        let dripped =
            elapsed.as_secs_f64() * self.tokens_per_interval / self.interval.as_secs_f64();
        state.content = (state.content + dripped).min(self.bucket_size);
        state.last_refill = now;
        trace!("Token bucket: {:.3} tokens available", state.content);
    }

    /// Current number of tokens, after refill
    pub fn content(&self) -> JwksClientResult<f64> {
        let mut state = self.lock()?;
        self.drip(&mut state);
        Ok(state.content)
    }

    /// Remove `count` tokens if they are available right now
    pub fn try_remove_tokens(&self, count: f64) -> JwksClientResult<bool> {
        if count > self.bucket_size {
            return Ok(false);
        }
        let mut state = self.lock()?;
        self.drip(&mut state);
        if count > state.content {
            return Ok(false);
        }
        state.content -= count;
        Ok(true)
    }

    /// Remove `count` tokens, sleeping until the bucket holds enough.
    ///
    /// Returns the tokens left after removal.
    ///
    /// # Errors
    ///
    /// [`JwksClientError::RateLimit`] when `count` can never fit in the bucket
    pub async fn remove_tokens(&self, count: f64) -> JwksClientResult<f64> {
        if count > self.bucket_size {
            return Err(JwksClientError::RateLimit(format!(
                "Requested tokens {count} exceeds bucket size {}",
                self.bucket_size
            )));
        }
        loop {
            let wait = {
                let mut state = self.lock()?;
                self.drip(&mut state);
                if count <= state.content {
                    state.content -= count;
                    return Ok(state.content);
                }
                let missing = count - state.content;
                Duration::from_secs_f64(
                    missing * self.interval.as_secs_f64() / self.tokens_per_interval,
                )
            };
            trace!("Token bucket: waiting {wait:?} for {count} tokens");
            tokio::time::sleep(wait).await;
        }
    }
}

struct Window {
    start: Instant,
    tokens_this_interval: f64,
}

/// Token bucket plus a hard cap of `tokens_per_interval` per `interval` window
pub struct RateLimiter {
    bucket: TokenBucket,
    tokens_per_interval: f64,
    interval: Duration,
    fire_immediately: bool,
    window: Mutex<Window>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(tokens_per_interval: u32, interval: Duration, fire_immediately: bool) -> Self {
        Self {
            bucket: TokenBucket::new(tokens_per_interval, tokens_per_interval, interval),
            tokens_per_interval: f64::from(tokens_per_interval),
            interval,
            fire_immediately,
            window: Mutex::new(Window {
                start: Instant::now(),
                tokens_this_interval: 0.0,
            }),
        }
    }

    /// The JWKS endpoint limiter: `requests_per_minute` burst, same refill per minute
    #[must_use]
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self::new(requests_per_minute, Duration::from_secs(60), true)
    }

    fn lock_window(&self) -> JwksClientResult<MutexGuard<'_, Window>> {
        self.window.lock().map_err(|e| {
            JwksClientError::Default(format!("cannot lock the rate limiter window. Error: {e:?}"))
        })
    }

    /// Start a new window when the current one is over; returns the time left in it
    fn roll_window(&self, window: &mut Window) -> Duration {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(window.start);
        if elapsed >= self.interval {
            window.start = now;
            window.tokens_this_interval = 0.0;
            return self.interval;
        }
        self.interval.saturating_sub(elapsed)
    }

    /// Remove `count` tokens.
    ///
    /// With `fire_immediately` the call never waits and returns [`NO_TOKEN`]
    /// when the budget is exhausted; otherwise it waits for the budget.
    /// Returns the tokens left in the bucket.
    pub async fn remove_tokens(&self, count: f64) -> JwksClientResult<f64> {
        if count > self.bucket.bucket_size() {
            if self.fire_immediately {
                return Ok(NO_TOKEN);
            }
            return Err(JwksClientError::RateLimit(format!(
                "Requested tokens {count} exceeds maximum tokens per interval {}",
                self.tokens_per_interval
            )));
        }

        if self.fire_immediately {
            return Ok(if self.try_remove_tokens(count)? {
                self.bucket.content()?
            } else {
                NO_TOKEN
            });
        }

        loop {
            let wait = {
                let mut window = self.lock_window()?;
                let left = self.roll_window(&mut window);
                (count > self.tokens_per_interval - window.tokens_this_interval).then_some(left)
            };
            match wait {
                Some(wait) => tokio::time::sleep(wait).await,
                None => break,
            }
        }
        let remaining = self.bucket.remove_tokens(count).await?;
        let mut window = self.lock_window()?;
        self.roll_window(&mut window);
        window.tokens_this_interval += count;
        Ok(remaining)
    }

    /// Remove `count` tokens only if both the window and the bucket allow it now
    pub fn try_remove_tokens(&self, count: f64) -> JwksClientResult<bool> {
        let mut window = self.lock_window()?;
        self.roll_window(&mut window);
        if count > self.tokens_per_interval - window.tokens_this_interval {
            return Ok(false);
        }
        if !self.bucket.try_remove_tokens(count)? {
            return Ok(false);
        }
        window.tokens_this_interval += count;
        Ok(true)
    }

    /// Tokens currently available in the bucket
    pub fn tokens_remaining(&self) -> JwksClientResult<f64> {
        self.bucket.content()
    }
}
