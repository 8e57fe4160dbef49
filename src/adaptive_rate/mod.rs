//! Admit probe requests for a half-open circuit at an adaptive rate, and decide when to close it.

mod closer;
pub mod controller;
pub mod error;
pub mod internal_event;
pub mod layer;
pub mod outcome;
pub mod service;
pub mod token_bucket;

use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Deserializer};
use snafu::ensure;

pub use closer::{OpenToClosed, ProbeCloser, closer_factory, closer_factory_with};
pub use controller::{Aimd, RateController};
pub use error::{ConfigError, ProbeError};
use error::{DecreaseOutOfRangeSnafu, InvalidInitialRateSnafu, NegativeIncreaseSnafu};
pub use layer::ProbeLayer;
pub use outcome::{ErrorClass, ErrorKind};
pub use service::{ProbeLogic, ProbeService};

fn instant_now() -> std::time::Instant {
    tokio::time::Instant::now().into()
}

/// Fully resolved probe closer parameters.
///
/// Produced by [`ProbeCloserConfig::merge`]; every field has a concrete value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeCloserSettings {
    /// Requests per second added to the rate for every successful probe.
    ///
    /// Zero disables increase.
    pub additive_increase: f64,

    /// Factor applied to the rate for every failed or timed out probe.
    ///
    /// Should lie in (0, 1). Values of one or more do not decrease the rate at
    /// all; see [`ProbeCloserSettings::validate`].
    pub multiplicative_decrease: f64,

    /// Requests per second restored whenever the circuit opens or closes.
    ///
    /// Zero means unbounded.
    pub initial_rate: f64,

    /// Maximum number of probes admitted at a single instant.
    ///
    /// Zero admits nothing.
    pub burst: u32,

    /// How long a probe window must go without a denial or a failure before the circuit may close.
    pub close_on_happy_duration: Duration,
}

/// Starting point for every closer; any field left unset in a [`ProbeCloserConfig`] comes from here.
///
/// The initial rate is one request per microsecond.
pub const DEFAULT_SETTINGS: ProbeCloserSettings = ProbeCloserSettings {
    additive_increase: 0.1,
    multiplicative_decrease: 0.5,
    initial_rate: 1_000_000.0,
    burst: 10,
    close_on_happy_duration: Duration::from_secs(10),
};

impl Default for ProbeCloserSettings {
    fn default() -> Self {
        DEFAULT_SETTINGS
    }
}

impl ProbeCloserSettings {
    /// Reports parameters that will not behave as their names suggest.
    ///
    /// Nothing in this crate calls this to reject a configuration; a closer built
    /// from invalid settings still runs and only logs a warning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let decrease = self.multiplicative_decrease;
        ensure!(
            decrease > 0.0 && decrease < 1.0,
            DecreaseOutOfRangeSnafu { decrease }
        );
        let increase = self.additive_increase;
        ensure!(increase >= 0.0, NegativeIncreaseSnafu { increase });
        let rate = self.initial_rate;
        ensure!(rate >= 0.0, InvalidInitialRateSnafu { rate });
        Ok(())
    }
}

/// User-facing probe closer configuration.
///
/// Every field is optional; unset fields fall back to a set of defaults when
/// [merged](ProbeCloserConfig::merge). An explicitly set zero is kept, so
/// `initial_rate = 0` really means unbounded and `burst = 0` really means closed.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use aimd_closer::adaptive_rate::{DEFAULT_SETTINGS, ProbeCloserConfig};
///
/// let settings = ProbeCloserConfig::builder()
///     .burst(1)
///     .close_on_happy_duration(Duration::from_secs(5))
///     .build()
///     .merge(&DEFAULT_SETTINGS);
///
/// assert_eq!(settings.burst, 1);
/// assert_eq!(settings.multiplicative_decrease, 0.5);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Builder, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeCloserConfig {
    pub additive_increase: Option<f64>,
    pub multiplicative_decrease: Option<f64>,
    pub initial_rate: Option<f64>,
    pub burst: Option<u32>,
    #[serde(
        rename = "close_on_happy_duration_secs",
        deserialize_with = "deserialize_opt_secs"
    )]
    pub close_on_happy_duration: Option<Duration>,
}

impl ProbeCloserConfig {
    /// Resolves this configuration against `defaults`, field by field.
    pub fn merge(&self, defaults: &ProbeCloserSettings) -> ProbeCloserSettings {
        ProbeCloserSettings {
            additive_increase: self.additive_increase.unwrap_or(defaults.additive_increase),
            multiplicative_decrease: self
                .multiplicative_decrease
                .unwrap_or(defaults.multiplicative_decrease),
            initial_rate: self.initial_rate.unwrap_or(defaults.initial_rate),
            burst: self.burst.unwrap_or(defaults.burst),
            close_on_happy_duration: self
                .close_on_happy_duration
                .unwrap_or(defaults.close_on_happy_duration),
        }
    }
}

fn deserialize_opt_secs<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)?
        .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
        .transpose()
}
