/// How a probe request that did not succeed ended.
///
/// Mirrors the failure taxonomy of a circuit breaker. Only some of these say
/// anything about the downstream's health; see [`ErrorKind::class`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The downstream returned an error.
    Failure,
    /// The downstream did not answer in time.
    Timeout,
    /// The request itself was malformed.
    BadRequest,
    /// The caller gave up on the request.
    Interrupt,
    /// A local concurrency limit refused the request before it was sent.
    ConcurrencyLimitReject,
    /// The circuit refused the request before it was sent.
    ShortCircuit,
}

/// What an [`ErrorKind`] means for the probe window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The downstream is unhealthy: slow down and restart the happy window.
    Unhealthy,
    /// Local or caller-side condition; leaves both the rate and the happy window untouched.
    Ignored,
}

impl ErrorKind {
    pub const fn class(self) -> ErrorClass {
        match self {
            ErrorKind::Failure | ErrorKind::Timeout => ErrorClass::Unhealthy,
            ErrorKind::BadRequest
            | ErrorKind::Interrupt
            | ErrorKind::ConcurrencyLimitReject
            | ErrorKind::ShortCircuit => ErrorClass::Ignored,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Failure => "failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Interrupt => "interrupt",
            ErrorKind::ConcurrencyLimitReject => "concurrency_limit_reject",
            ErrorKind::ShortCircuit => "short_circuit",
        }
    }
}

impl ErrorClass {
    pub const fn is_unhealthy(&self) -> bool {
        matches!(self, ErrorClass::Unhealthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_failures_and_timeouts_are_unhealthy() {
        let unhealthy = [ErrorKind::Failure, ErrorKind::Timeout];
        let ignored = [
            ErrorKind::BadRequest,
            ErrorKind::Interrupt,
            ErrorKind::ConcurrencyLimitReject,
            ErrorKind::ShortCircuit,
        ];

        for kind in unhealthy {
            assert_eq!(kind.class(), ErrorClass::Unhealthy, "{}", kind.as_str());
            assert!(kind.class().is_unhealthy());
        }
        for kind in ignored {
            assert_eq!(kind.class(), ErrorClass::Ignored, "{}", kind.as_str());
        }
    }
}
