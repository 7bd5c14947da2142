//! Per-job request rate limiting
//!
//! A token bucket shared by all workers of one crawl. Capacity equals the
//! configured requests-per-minute; tokens refill continuously at max/60 per
//! second. The bucket starts empty so a fresh job cannot burst a full
//! minute's budget in its first instant.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Token bucket limiting request throughput
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Bucket sized for `max_per_minute` requests per minute.
    pub fn per_minute(max_per_minute: u32) -> Self {
        let max = max_per_minute.max(1) as f64;
        Self {
            state: Mutex::new(BucketState {
                tokens: 0.0,
                last_refill: Instant::now(),
            }),
            capacity: max,
            refill_per_sec: max / 60.0,
        }
    }

    /// Take one token, sleeping until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn starts_empty_and_refills_over_time() {
        let bucket = TokenBucket::per_minute(60);
        assert!(bucket.available() < 1.0);

        tokio::time::advance(Duration::from_secs(2)).await;
        let available = bucket.available();
        assert!((available - 2.0).abs() < 0.01, "got {}", available);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_caps_at_capacity() {
        let bucket = TokenBucket::per_minute(60);
        tokio::time::advance(Duration::from_secs(600)).await;
        assert!((bucket.available() - 60.0).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_a_token() {
        let bucket = TokenBucket::per_minute(60); // 1 token per second
        let start = Instant::now();
        bucket.acquire().await;
        let waited = start.elapsed();
        assert!(
            waited >= Duration::from_millis(990) && waited <= Duration::from_millis(1100),
            "waited {:?}",
            waited
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_rate_matches_configuration() {
        let bucket = TokenBucket::per_minute(120); // 2 tokens per second
        let start = Instant::now();
        for _ in 0..10 {
            bucket.acquire().await;
        }
        let elapsed = start.elapsed();
        // 10 tokens at 2/sec from an empty bucket needs ~5 seconds
        assert!(
            elapsed >= Duration::from_millis(4900) && elapsed <= Duration::from_millis(5500),
            "elapsed {:?}",
            elapsed
        );
    }
}
