use std::time::Instant;

use super::{ProbeCloserSettings, token_bucket::TokenBucket};

/// A rate limiter that adapts how many requests it admits based on feedback.
///
/// Every operation takes the caller's notion of "now" so implementations can be
/// driven deterministically. Implementations are not expected to be internally
/// synchronized; [`ProbeCloser`](super::ProbeCloser) serializes all access.
pub trait RateController: Send {
    /// Restores the configured starting rate and a full burst.
    fn reset(&mut self, now: Instant);

    /// Feedback that the downstream is unhealthy; admit fewer requests.
    fn on_failure(&mut self, now: Instant);

    /// Feedback that a request succeeded; admit more requests.
    fn on_success(&mut self, now: Instant);

    /// Returns whether a request may go ahead right now, consuming capacity if so.
    fn attempt_reserve(&mut self, now: Instant) -> bool;

    /// The current admission rate in requests per second.
    fn rate(&self) -> f64;
}

/// Additive-increase/multiplicative-decrease controller over a [`TokenBucket`].
///
/// Increase and decrease always apply to the *current* rate, so repeated
/// signals compound. There is no floor or ceiling: a long run of failures
/// drives the refill rate toward zero, although tokens already banked in the
/// burst remain spendable.
#[derive(Clone, Debug)]
pub struct Aimd {
    additive_increase: f64,
    multiplicative_decrease: f64,
    // Zero means unbounded.
    initial_rate: f64,
    // Zero disables admission entirely.
    burst: u32,
    bucket: Option<TokenBucket>,
}

impl Aimd {
    pub const fn new(
        additive_increase: f64,
        multiplicative_decrease: f64,
        initial_rate: f64,
        burst: u32,
    ) -> Self {
        Self {
            additive_increase,
            multiplicative_decrease,
            initial_rate,
            burst,
            bucket: None,
        }
    }

    pub const fn additive_increase(&self) -> f64 {
        self.additive_increase
    }

    pub const fn multiplicative_decrease(&self) -> f64 {
        self.multiplicative_decrease
    }

    pub const fn initial_rate(&self) -> f64 {
        self.initial_rate
    }

    pub const fn burst(&self) -> u32 {
        self.burst
    }

    fn initial_limit(&self) -> f64 {
        if self.initial_rate == 0.0 {
            f64::INFINITY
        } else {
            self.initial_rate
        }
    }

    // An unbounded rate scaled by zero has no meaningful value; treat it as stopped.
    fn settle(rate: f64) -> f64 {
        if rate.is_nan() { 0.0 } else { rate }
    }

    // The bucket is created lazily, which is equivalent to a reset at first use.
    fn bucket(&mut self, now: Instant) -> &mut TokenBucket {
        let (rate, burst) = (self.initial_limit(), self.burst);
        self.bucket
            .get_or_insert_with(|| TokenBucket::new(rate, burst, now))
    }
}

impl From<&ProbeCloserSettings> for Aimd {
    fn from(settings: &ProbeCloserSettings) -> Self {
        Self::new(
            settings.additive_increase,
            settings.multiplicative_decrease,
            settings.initial_rate,
            settings.burst,
        )
    }
}

impl RateController for Aimd {
    fn reset(&mut self, now: Instant) {
        self.bucket = Some(TokenBucket::new(self.initial_limit(), self.burst, now));
    }

    fn on_failure(&mut self, now: Instant) {
        let decrease = self.multiplicative_decrease;
        let bucket = self.bucket(now);
        let rate = Self::settle(bucket.rate() * decrease);
        bucket.set_rate(now, rate);
        trace!(message = "Rate decreased.", rate);
    }

    fn on_success(&mut self, now: Instant) {
        let increase = self.additive_increase;
        let bucket = self.bucket(now);
        let rate = Self::settle(bucket.rate() + increase);
        bucket.set_rate(now, rate);
        trace!(message = "Rate increased.", rate);
    }

    fn attempt_reserve(&mut self, now: Instant) -> bool {
        self.bucket(now).try_take(now)
    }

    fn rate(&self) -> f64 {
        match &self.bucket {
            Some(bucket) => bucket.rate(),
            None => self.initial_limit(),
        }
    }
}
