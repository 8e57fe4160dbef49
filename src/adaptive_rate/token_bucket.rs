use std::time::Instant;

/// Continuous-refill token bucket driven by caller-supplied timestamps.
///
/// Tokens are fractional so refill is smooth between reservations. The rate is
/// expressed in tokens per second; `f64::INFINITY` keeps the bucket permanently
/// full, while a capacity of zero never admits anything.
#[derive(Clone, Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: u32,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a bucket that is full at `now`.
    pub fn new(rate: f64, capacity: u32, now: Instant) -> Self {
        Self {
            rate,
            capacity,
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    pub const fn rate(&self) -> f64 {
        self.rate
    }

    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    pub const fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Changes the refill rate at `now`.
    ///
    /// Tokens owed for the time before `now` are credited at the old rate, so a
    /// rate change never retroactively applies to elapsed time.
    pub fn set_rate(&mut self, now: Instant, rate: f64) {
        self.refill(now);
        self.rate = rate;
    }

    /// Refills for elapsed time and consumes one token if available.
    pub fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    // Timestamps at or before `last_refill` are a no-op; the bucket never
    // loses tokens to refill and `last_refill` never moves backwards.
    fn refill(&mut self, now: Instant) {
        let capacity = f64::from(self.capacity);
        if self.rate == f64::INFINITY {
            self.tokens = capacity;
        }

        let Some(elapsed) = now.checked_duration_since(self.last_refill) else {
            return;
        };
        if elapsed.is_zero() {
            return;
        }

        if self.rate > 0.0 && self.rate.is_finite() {
            let earned = elapsed.as_secs_f64() * self.rate;
            self.tokens = (self.tokens + earned).min(capacity);
        }
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn starts_full() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(1.0, 3, now);

        assert!(bucket.try_take(now));
        assert!(bucket.try_take(now));
        assert!(bucket.try_take(now));
        assert!(!bucket.try_take(now));
    }

    #[test]
    fn refill_is_capped_at_capacity() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(100.0, 2, now);
        assert!(bucket.try_take(now));
        assert!(bucket.try_take(now));

        let later = now + Duration::from_secs(60);
        assert!(bucket.try_take(later));
        assert!(bucket.try_take(later));
        assert!(!bucket.try_take(later));
    }

    #[test]
    fn earlier_timestamps_do_not_remove_tokens() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(4.0, 1, now + Duration::from_secs(1));
        assert_eq!(bucket.tokens(), 1.0);

        // A stale timestamp neither refills nor rewinds the refill clock.
        assert!(bucket.try_take(now));
        assert_eq!(bucket.tokens(), 0.0);
        assert!(!bucket.try_take(now));

        assert!(!bucket.try_take(now + Duration::from_millis(1125)));
        assert_eq!(bucket.tokens(), 0.5);
        assert!(bucket.try_take(now + Duration::from_millis(1250)));
    }

    #[test]
    fn set_rate_credits_elapsed_time_at_old_rate() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(2.0, 4, now);
        for _ in 0..4 {
            assert!(bucket.try_take(now));
        }

        bucket.set_rate(now + Duration::from_secs(1), 0.0);
        assert_eq!(bucket.tokens(), 2.0);
        assert_eq!(bucket.rate(), 0.0);

        // A zero rate keeps what is already banked but never earns more.
        let much_later = now + Duration::from_secs(3600);
        assert!(bucket.try_take(much_later));
        assert!(bucket.try_take(much_later));
        assert!(!bucket.try_take(much_later));
    }

    #[test]
    fn infinite_rate_always_admits() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(f64::INFINITY, 1, now);
        for _ in 0..1_000 {
            assert!(bucket.try_take(now));
        }
    }

    #[test]
    fn zero_capacity_never_admits() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(f64::INFINITY, 0, now);
        assert!(!bucket.try_take(now));
        assert!(!bucket.try_take(now + Duration::from_secs(10)));
    }
}
