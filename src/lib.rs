//! Adaptive admission control for a circuit breaker's half-open state.
//!
//! While a circuit recovers, [`adaptive_rate::ProbeCloser`] decides probe by
//! probe whether a request may go through, and when sustained health justifies
//! closing the circuit again.
//!
//! # Algorithm Overview
//!
//! Probes are admitted from a token bucket whose refill rate follows AIMD:
//! 1. **Additive Increase**: every successful probe adds a fixed amount to the rate
//! 2. **Multiplicative Decrease**: every failed or timed out probe multiplies the rate by a factor below one
//!
//! The circuit may close once no probe has been denied and none has failed for
//! a configured duration. Opening or closing the circuit restores the initial
//! rate and burst and restarts that window.
//!
//! # Safety & Concurrency
//! - Thread-safe: a closer guards all of its state with a single lock
//! - Every operation takes the current instant explicitly, so behavior is reproducible in tests
//! - No unsafe code
//!
//! # Basic Usage
//! ```
//! use std::time::{Duration, Instant};
//! use aimd_closer::adaptive_rate::{ErrorKind, ProbeCloserConfig, closer_factory};
//!
//! let new_closer = closer_factory(ProbeCloserConfig::builder().burst(1).build());
//! let closer = new_closer("payments");
//!
//! let now = Instant::now();
//! closer.opened(now);
//! if closer.allow(now) {
//!     // ... send the probe ...
//!     closer.error(now, ErrorKind::Timeout, Some(Duration::from_secs(1)));
//! }
//! assert!(!closer.should_close(now + Duration::from_secs(1)));
//! ```
//!
//! # Metrics
//! Emits admission, signal and rate metrics through the `metrics` facade.
pub mod adaptive_rate;

#[macro_use]
extern crate tracing;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
