//! LLM pacing
//!
//! A token bucket sized in LLM tokens per minute (Groq's free tier allows
//! 6000). Callers reserve an estimate before each model call and wait until
//! the bucket can cover it. Waiting goes through a [`Sleeper`] so tests can
//! drive a fake clock instead of sleeping.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::{debug, info};

use crate::types::{AppError, AppResult};

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Paces model calls for the orchestrator.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Block until `tokens` can be spent; returns the time waited.
    async fn acquire(&self, tokens: u32) -> AppResult<Duration>;

    /// Fixed pause between attempts.
    async fn cooldown(&self, duration: Duration);
}

pub struct Throttle<C: Clock = DefaultClock> {
    limiter: RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<C::Instant>>,
    clock: C,
    sleeper: Arc<dyn Sleeper>,
    capacity: NonZeroU32,
}

impl Throttle<DefaultClock> {
    pub fn per_minute(tokens_per_minute: u32) -> AppResult<Self> {
        Self::with_clock(tokens_per_minute, DefaultClock::default(), Arc::new(TokioSleeper))
    }
}

impl<C> Throttle<C>
where
    C: Clock + Clone + Send + Sync,
    C::Instant: Send + Sync,
{
    pub fn with_clock(tokens_per_minute: u32, clock: C, sleeper: Arc<dyn Sleeper>) -> AppResult<Self> {
        let capacity = NonZeroU32::new(tokens_per_minute)
            .ok_or_else(|| AppError::Config("LLM tokens per minute must be greater than zero".to_string()))?;
        let limiter = RateLimiter::direct_with_clock(Quota::per_minute(capacity), clock.clone());

        Ok(Self {
            limiter,
            clock,
            sleeper,
            capacity,
        })
    }
}

#[async_trait]
impl<C> Pacer for Throttle<C>
where
    C: Clock + Clone + Send + Sync,
    C::Instant: Send + Sync,
{
    async fn acquire(&self, tokens: u32) -> AppResult<Duration> {
        // Requests larger than the bucket would never fit; cap them at a full bucket
        let requested = tokens.clamp(1, self.capacity.get());
        let n = NonZeroU32::new(requested).unwrap_or(NonZeroU32::MIN);
        let mut waited = Duration::ZERO;

        loop {
            let wait = match self.limiter.check_n(n) {
                Ok(Ok(())) => {
                    debug!(tokens = requested, waited_ms = waited.as_millis() as u64, "LLM tokens reserved");
                    return Ok(waited);
                }
                Ok(Err(not_until)) => not_until.wait_time_from(self.clock.now()),
                Err(e) => return Err(AppError::Internal(format!("Throttle capacity exceeded: {}", e))),
            };

            info!(tokens = requested, wait_secs = wait.as_secs_f64(), "Waiting for LLM token budget");
            self.sleeper.sleep(wait).await;
            waited += wait;
        }
    }

    async fn cooldown(&self, duration: Duration) {
        self.sleeper.sleep(duration).await;
    }
}
