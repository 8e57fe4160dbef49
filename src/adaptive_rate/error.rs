use snafu::Snafu;

/// Settings that run, but not the way their names suggest.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display(
        "multiplicative_decrease must lie in (0, 1), got {decrease}; the rate will not shrink on failure"
    ))]
    DecreaseOutOfRange { decrease: f64 },
    #[snafu(display("additive_increase must not be negative, got {increase}"))]
    NegativeIncrease { increase: f64 },
    #[snafu(display("initial_rate must be zero (unbounded) or positive, got {rate}"))]
    InvalidInitialRate { rate: f64 },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProbeError {
    #[snafu(display("Probe rejected: the half-open rate limit is exhausted"))]
    Rejected,
}
