use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use super::{
    Aimd, DEFAULT_SETTINGS, ProbeCloserConfig, ProbeCloserSettings, RateController,
    instant_now,
    internal_event::{ProbeAdmission, ProbeRate, ProbeSignal, ProbeSignalData},
    outcome::{ErrorClass, ErrorKind},
};

/// The half-open side of a circuit breaker: what the breaker asks while it
/// decides whether to go from open back to closed.
pub trait OpenToClosed: Send + Sync {
    /// Whether a probe request may be sent now.
    fn allow(&self, now: Instant) -> bool;

    /// A probe succeeded after `elapsed`.
    fn success(&self, now: Instant, elapsed: Duration);

    /// A probe ended with `kind`. `elapsed` is absent for requests that were never sent.
    fn error(&self, now: Instant, kind: ErrorKind, elapsed: Option<Duration>);

    /// The circuit just opened.
    fn opened(&self, now: Instant);

    /// The circuit just closed.
    fn closed(&self, now: Instant);

    /// Whether the circuit has been healthy long enough to close.
    fn should_close(&self, now: Instant) -> bool;
}

struct CloserState<C> {
    controller: C,
    last_unhappy: Instant,
}

/// Lets probes through at an adaptive rate and closes the circuit once no
/// probe has been denied or failed for a configured duration.
///
/// A denied admission counts as unhappy: being rate limited means the
/// downstream has not proven it can take more traffic yet. All state sits
/// behind a single lock; every method holds it for a constant amount of work.
pub struct ProbeCloser<C = Aimd> {
    state: Mutex<CloserState<C>>,
    close_on_happy_duration: Duration,
    admission: ProbeAdmission,
    signal: ProbeSignal,
    rate: ProbeRate,
}

/// Returns a constructor of [`ProbeCloser`]s, one per circuit.
///
/// `config` is merged with [`DEFAULT_SETTINGS`] once; each closer starts its
/// happy window at the moment it is built. The circuit name labels the
/// closer's metrics.
pub fn closer_factory(
    config: ProbeCloserConfig,
) -> impl Fn(&str) -> ProbeCloser + Clone + Send + Sync {
    let settings = config.merge(&DEFAULT_SETTINGS);
    move |circuit| ProbeCloser::new(circuit, &settings, instant_now())
}

/// Like [`closer_factory`], with every closer driven by a controller from `new_controller`.
///
/// Only the close-on-happy duration is taken from the merged `config`; the
/// controller carries its own tuning.
pub fn closer_factory_with<C, F>(
    config: ProbeCloserConfig,
    new_controller: F,
) -> impl Fn(&str) -> ProbeCloser<C> + Clone + Send + Sync
where
    C: RateController,
    F: Fn() -> C + Clone + Send + Sync,
{
    let close_on_happy_duration = config.merge(&DEFAULT_SETTINGS).close_on_happy_duration;
    move |circuit| {
        ProbeCloser::with_controller(
            circuit,
            new_controller(),
            close_on_happy_duration,
            instant_now(),
        )
    }
}

impl ProbeCloser<Aimd> {
    /// Builds a closer around an [`Aimd`] controller.
    ///
    /// Settings are not rejected; anything [`ProbeCloserSettings::validate`]
    /// flags is logged and used as given.
    pub fn new(circuit: &str, settings: &ProbeCloserSettings, now: Instant) -> Self {
        if let Err(error) = settings.validate() {
            warn!(message = "Suspicious probe closer settings; using them as given.", circuit, %error);
        }
        Self::with_controller(
            circuit,
            Aimd::from(settings),
            settings.close_on_happy_duration,
            now,
        )
    }
}

impl<C: RateController> ProbeCloser<C> {
    pub fn with_controller(
        circuit: &str,
        controller: C,
        close_on_happy_duration: Duration,
        now: Instant,
    ) -> Self {
        let rate = ProbeRate::register(circuit);
        rate.emit(controller.rate());
        Self {
            state: Mutex::new(CloserState {
                controller,
                last_unhappy: now,
            }),
            close_on_happy_duration,
            admission: ProbeAdmission::register(circuit),
            signal: ProbeSignal::register(circuit),
            rate,
        }
    }

    // Every critical section leaves the state consistent, so a poisoned lock
    // still guards valid data.
    fn lock(&self) -> MutexGuard<'_, CloserState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attempts to reserve a probe. A denial restarts the happy window.
    pub fn allow(&self, now: Instant) -> bool {
        let allowed = {
            let mut state = self.lock();
            let allowed = state.controller.attempt_reserve(now);
            if !allowed {
                state.last_unhappy = now;
            }
            allowed
        };
        self.admission.emit(allowed);
        allowed
    }

    /// Raises the rate. Does not touch the happy window.
    pub fn success(&self, now: Instant, elapsed: Duration) {
        {
            let mut state = self.lock();
            state.controller.on_success(now);
            self.rate.emit(state.controller.rate());
        }
        self.signal.emit(ProbeSignalData::Success { elapsed });
    }

    /// The downstream failed or timed out: lower the rate and restart the happy window.
    pub fn failure_signal(&self, now: Instant, elapsed: Option<Duration>) {
        {
            let mut state = self.lock();
            state.controller.on_failure(now);
            state.last_unhappy = now;
            self.rate.emit(state.controller.rate());
        }
        self.signal.emit(ProbeSignalData::Unhealthy { elapsed });
    }

    /// Outcomes that say nothing about the downstream leave the rate and the happy window alone.
    pub fn ignored_signal(&self, _now: Instant) {
        self.signal.emit(ProbeSignalData::Ignored);
    }

    /// Routes an error outcome by its [`ErrorClass`].
    pub fn error(&self, now: Instant, kind: ErrorKind, elapsed: Option<Duration>) {
        trace!(message = "Probe error.", kind = kind.as_str(), elapsed = ?elapsed);
        match kind.class() {
            ErrorClass::Unhealthy => self.failure_signal(now, elapsed),
            ErrorClass::Ignored => self.ignored_signal(now),
        }
    }

    pub fn opened(&self, now: Instant) {
        self.restart(now);
        debug!(message = "Circuit opened; probe window restarted.");
    }

    pub fn closed(&self, now: Instant) {
        self.restart(now);
        debug!(message = "Circuit closed; probe window restarted.");
    }

    // The gauge is written under the lock so concurrent updates land in lock order.
    fn restart(&self, now: Instant) {
        let mut state = self.lock();
        state.last_unhappy = now;
        state.controller.reset(now);
        self.rate.emit(state.controller.rate());
    }

    /// True once strictly more than the close-on-happy duration has passed
    /// since the last denial or failure.
    pub fn should_close(&self, now: Instant) -> bool {
        let last_unhappy = self.lock().last_unhappy;
        now.saturating_duration_since(last_unhappy) > self.close_on_happy_duration
    }

    pub fn rate(&self) -> f64 {
        self.lock().controller.rate()
    }

    pub fn last_unhappy(&self) -> Instant {
        self.lock().last_unhappy
    }

    pub const fn close_on_happy_duration(&self) -> Duration {
        self.close_on_happy_duration
    }
}

impl<C: RateController> OpenToClosed for ProbeCloser<C> {
    fn allow(&self, now: Instant) -> bool {
        Self::allow(self, now)
    }

    fn success(&self, now: Instant, elapsed: Duration) {
        Self::success(self, now, elapsed)
    }

    fn error(&self, now: Instant, kind: ErrorKind, elapsed: Option<Duration>) {
        Self::error(self, now, kind, elapsed)
    }

    fn opened(&self, now: Instant) {
        Self::opened(self, now)
    }

    fn closed(&self, now: Instant) {
        Self::closed(self, now)
    }

    fn should_close(&self, now: Instant) -> bool {
        Self::should_close(self, now)
    }
}

impl<C: RateController> fmt::Debug for ProbeCloser<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ProbeCloser")
            .field("rate", &state.controller.rate())
            .field("last_unhappy", &state.last_unhappy)
            .field("close_on_happy_duration", &self.close_on_happy_duration)
            .finish()
    }
}
