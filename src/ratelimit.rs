use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorRateLimiter};
use std::time::Duration;

/// Keeps consecutive page fetches at least `interval` apart so the target
/// site isn't hammered.
pub struct RateLimiter {
    // None when the interval is zero.
    between_requests: Option<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        // Burst of one: the first request passes straight away, every later
        // one waits for the previous period to elapse.
        let between_requests = Quota::with_period(interval).map(GovernorRateLimiter::direct);
        RateLimiter { between_requests }
    }

    pub async fn wait_until_ready(&self) {
        if let Some(limiter) = &self.between_requests {
            limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn first_request_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let start = Instant::now();
        limiter.wait_until_ready().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn later_requests_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.wait_until_ready().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn zero_interval_never_waits() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.wait_until_ready().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
