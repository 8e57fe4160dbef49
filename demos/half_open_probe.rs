//! Drives a probe closer against a simulated downstream that recovers after a few seconds.
//!
//! Run with `cargo run --example half_open_probe`.

use std::time::{Duration, Instant};

use aimd_closer::adaptive_rate::{DEFAULT_SETTINGS, ErrorKind, ProbeCloser, ProbeCloserConfig};
use tracing::{Level, info};

const RECOVERS_AFTER: Duration = Duration::from_secs(3);
const TICK: Duration = Duration::from_millis(50);
const GIVE_UP_AFTER: u32 = 400;
// Below this many probes per second the breaker gives up and reopens.
const REOPEN_BELOW: f64 = 1.0;

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let settings = ProbeCloserConfig::builder()
        .initial_rate(20.0)
        .burst(2)
        .additive_increase(1.0)
        .close_on_happy_duration(Duration::from_secs(2))
        .build()
        .merge(&DEFAULT_SETTINGS);

    let start = Instant::now();
    let closer = ProbeCloser::new("downstream", &settings, start);
    closer.opened(start);

    let mut sent = 0;
    for tick in 1..=GIVE_UP_AFTER {
        let now = start + TICK * tick;
        if closer.should_close(now) {
            info!(probes = sent, after = ?(now - start), rate = closer.rate(), "Circuit may close.");
            return;
        }
        if !closer.allow(now) {
            continue;
        }

        sent += 1;
        if now - start < RECOVERS_AFTER {
            closer.error(now, ErrorKind::Timeout, Some(TICK));
            let rate = closer.rate();
            info!(probes = sent, rate, "Probe timed out.");
            if rate < REOPEN_BELOW {
                info!(rate, "Rate collapsed; reopening.");
                closer.opened(now);
            }
        } else {
            closer.success(now, Duration::from_millis(5));
        }
    }
    info!(probes = sent, "Downstream never recovered.");
}
