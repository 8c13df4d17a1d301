//! Rate Limiter (component D): token bucket with bucket capacity equal to
//! the rate (1s of burst), per spec.md §4.D.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::{Quota, RateLimiter as GovernorLimiter};

/// Paces a single entity's emission loop. Rate `0` disables the limiter
/// entirely, since `governor::Quota` cannot represent a zero rate.
pub enum RateLimiter {
    Unbounded,
    Bounded {
        limiter: GovernorLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            DefaultClock,
        >,
        clock: DefaultClock,
    },
}

impl RateLimiter {
    /// `rate_per_second <= 0.0` yields an unbounded limiter (spec.md §4.D:
    /// "Rate `0` disables the limiter").
    pub fn new(rate_per_second: f64) -> Self {
        if rate_per_second <= 0.0 {
            return RateLimiter::Unbounded;
        }
        let rounded = rate_per_second.round().max(1.0) as u32;
        let quota = Quota::per_second(NonZeroU32::new(rounded).unwrap());
        RateLimiter::Bounded {
            limiter: GovernorLimiter::direct(quota),
            clock: DefaultClock::default(),
        }
    }

    /// Reserve one token, returning how long the caller must wait before it
    /// is allowed to proceed. Callers are expected to `tokio::time::sleep`
    /// this duration; `0` means a token was immediately available.
    pub fn reserve(&self) -> Duration {
        match self {
            RateLimiter::Unbounded => Duration::ZERO,
            RateLimiter::Bounded { limiter, clock } => match limiter.check() {
                Ok(()) => Duration::ZERO,
                Err(not_until) => not_until.wait_time_from(clock.now()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_waits() {
        let limiter = RateLimiter::new(0.0);
        for _ in 0..1000 {
            assert_eq!(limiter.reserve(), Duration::ZERO);
        }
    }

    #[tokio::test]
    async fn bounded_limiter_paces_emission() {
        let limiter = RateLimiter::new(10.0);
        let start = tokio::time::Instant::now();
        let mut emitted = 0u32;
        while start.elapsed() < Duration::from_millis(500) {
            let wait = limiter.reserve();
            if wait > Duration::ZERO {
                tokio::time::sleep(wait).await;
            }
            emitted += 1;
            if emitted > 20 {
                break;
            }
        }
        // At 10/s over ~500ms we expect roughly 5-6 emissions, definitely
        // not the full burst of 20.
        assert!(emitted < 20);
    }

    // E6 / property 4: rate=10, duration=5s, emitted count within 10% of r*T.
    #[tokio::test]
    async fn e6_rate_fidelity_over_five_seconds() {
        let limiter = RateLimiter::new(10.0);
        let start = tokio::time::Instant::now();
        let mut emitted = 0u32;
        while start.elapsed() < Duration::from_secs(5) {
            let wait = limiter.reserve();
            if wait > Duration::ZERO {
                tokio::time::sleep(wait).await;
            }
            emitted += 1;
        }
        assert!((45..=55).contains(&emitted), "emitted {emitted} outside [45, 55]");
    }
}
