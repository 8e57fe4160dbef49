use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
    time::Instant,
};

use pin_project::pin_project;
use tower::Service;

use super::{
    Aimd, ProbeCloser, RateController, error::RejectedSnafu, instant_now, outcome::ErrorKind,
};
use crate::Error;

/// Decides what a finished probe says about the downstream.
///
/// # Example
/// ```rust
/// use aimd_closer::adaptive_rate::{ErrorKind, ProbeLogic};
///
/// #[derive(Clone)]
/// struct StatusLogic;
///
/// impl ProbeLogic for StatusLogic {
///     type Error = aimd_closer::Error;
///     type Response = u16;
///
///     fn classify_response(&self, status: &u16) -> Option<ErrorKind> {
///         match status {
///             400..=499 => Some(ErrorKind::BadRequest),
///             500..=599 => Some(ErrorKind::Failure),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait ProbeLogic: Clone + Send + Sync + 'static {
    /// The type of errors produced by the service
    type Error;

    /// The type of successful responses from the service
    type Response;

    /// Classifies a failed call. Every error counts against the downstream unless overridden.
    fn classify_error(&self, _error: &Self::Error) -> ErrorKind {
        ErrorKind::Failure
    }

    /// Classifies a successful call; `None` means the probe succeeded.
    fn classify_response(&self, _response: &Self::Response) -> Option<ErrorKind> {
        None
    }
}

/// Admits requests to the wrapped service only when the [`ProbeCloser`]
/// allows, and reports every outcome back to it.
///
/// Denied requests never reach the inner service; they fail with
/// [`ProbeError::Rejected`](super::ProbeError::Rejected).
pub struct ProbeService<S, L, C = Aimd> {
    inner: S,
    closer: Arc<ProbeCloser<C>>,
    logic: L,
}

impl<S, L, C> ProbeService<S, L, C> {
    pub const fn new(inner: S, closer: Arc<ProbeCloser<C>>, logic: L) -> Self {
        Self {
            inner,
            closer,
            logic,
        }
    }

    pub const fn closer(&self) -> &Arc<ProbeCloser<C>> {
        &self.closer
    }
}

impl<S: Clone, L: Clone, C> Clone for ProbeService<S, L, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            closer: Arc::clone(&self.closer),
            logic: self.logic.clone(),
        }
    }
}

impl<S: fmt::Debug, L, C: RateController> fmt::Debug for ProbeService<S, L, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeService")
            .field("inner", &self.inner)
            .field("closer", &self.closer)
            .finish_non_exhaustive()
    }
}

impl<S, L, C, Request> Service<Request> for ProbeService<S, L, C>
where
    S: Service<Request, Response = L::Response, Error = L::Error>,
    L: ProbeLogic,
    L::Error: Into<Error>,
    C: RateController,
{
    type Response = S::Response;
    type Error = Error;
    type Future = ResponseFuture<S::Future, L, C>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let now = instant_now();
        let inner = self
            .closer
            .allow(now)
            .then(|| self.inner.call(request));

        ResponseFuture {
            inner,
            closer: Arc::clone(&self.closer),
            logic: self.logic.clone(),
            started: now,
        }
    }
}

/// Future for [`ProbeService`]; resolves immediately when the probe was denied.
#[pin_project]
pub struct ResponseFuture<F, L, C> {
    #[pin]
    inner: Option<F>,
    closer: Arc<ProbeCloser<C>>,
    logic: L,
    started: Instant,
}

impl<F, L, C> Future for ResponseFuture<F, L, C>
where
    F: Future<Output = Result<L::Response, L::Error>>,
    L: ProbeLogic,
    L::Error: Into<Error>,
    C: RateController,
{
    type Output = Result<L::Response, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let Some(inner) = this.inner.as_pin_mut() else {
            return Poll::Ready(Err(RejectedSnafu.build().into()));
        };

        let result = ready!(inner.poll(cx));
        let now = instant_now();
        let elapsed = now.saturating_duration_since(*this.started);
        let outcome = match &result {
            Ok(response) => this.logic.classify_response(response),
            Err(error) => Some(this.logic.classify_error(error)),
        };
        match outcome {
            None => this.closer.success(now, elapsed),
            Some(kind) => this.closer.error(now, kind, Some(elapsed)),
        }

        Poll::Ready(result.map_err(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use std::{fmt, time::Duration};

    use tokio::time;
    use tokio_test::{assert_pending, assert_ready_err, assert_ready_ok, task};
    use tower_test::{assert_request_eq, mock};

    use super::*;
    use crate::adaptive_rate::{ProbeCloserSettings, ProbeError, layer::ProbeLayer};

    fn closer(burst: u32) -> Arc<ProbeCloser> {
        Arc::new(ProbeCloser::new(
            "svc",
            &ProbeCloserSettings {
                additive_increase: 1.0,
                multiplicative_decrease: 0.5,
                initial_rate: 4.0,
                burst,
                close_on_happy_duration: Duration::from_secs(5),
            },
            instant_now(),
        ))
    }

    #[tokio::test]
    async fn success_raises_rate() {
        let closer = closer(2);
        let (mut svc, mut handle) =
            mock::spawn_layer(ProbeLayer::new(Arc::clone(&closer), SvcProbeLogic));

        assert_ready_ok!(svc.poll_ready());
        let mut fut = task::spawn(svc.call("hello"));
        assert_pending!(fut.poll());

        assert_request_eq!(handle, "hello").send_response("world");
        assert_eq!(fut.await.unwrap(), "world");
        assert_eq!(closer.rate(), 5.0);
    }

    #[tokio::test]
    async fn unhealthy_error_lowers_rate() {
        let closer = closer(2);
        let (mut svc, mut handle) =
            mock::spawn_layer(ProbeLayer::new(Arc::clone(&closer), SvcProbeLogic));

        assert_ready_ok!(svc.poll_ready());
        let mut fut = task::spawn(svc.call("hello"));
        assert_request_eq!(handle, "hello").send_error(SvcError(true));
        assert_ready_err!(fut.poll());

        assert_eq!(closer.rate(), 2.0);
    }

    #[tokio::test]
    async fn ignored_error_keeps_rate() {
        let closer = closer(2);
        let last_unhappy = closer.last_unhappy();
        let (mut svc, mut handle) =
            mock::spawn_layer(ProbeLayer::new(Arc::clone(&closer), SvcProbeLogic));

        assert_ready_ok!(svc.poll_ready());
        let mut fut = task::spawn(svc.call("hello"));
        assert_request_eq!(handle, "hello").send_error(SvcError(false));
        assert_ready_err!(fut.poll());

        assert_eq!(closer.rate(), 4.0);
        assert_eq!(closer.last_unhappy(), last_unhappy);
    }

    #[tokio::test]
    async fn response_can_count_as_failure() {
        let closer = closer(2);
        let (mut svc, mut handle) =
            mock::spawn_layer(ProbeLayer::new(Arc::clone(&closer), SvcProbeLogic));

        assert_ready_ok!(svc.poll_ready());
        let mut fut = task::spawn(svc.call("hello"));
        assert_request_eq!(handle, "hello").send_response("overloaded");
        assert_eq!(assert_ready_ok!(fut.poll()), "overloaded");

        assert_eq!(closer.rate(), 2.0);
    }

    #[tokio::test]
    async fn rejects_beyond_burst_without_calling_inner() {
        time::pause();

        let closer = closer(1);
        let (mut svc, mut handle) =
            mock::spawn_layer(ProbeLayer::new(Arc::clone(&closer), SvcProbeLogic));

        assert_ready_ok!(svc.poll_ready());
        let mut first = task::spawn(svc.call("first"));

        assert_ready_ok!(svc.poll_ready());
        let mut second = task::spawn(svc.call("second"));
        let error = assert_ready_err!(second.poll());
        assert!(matches!(
            error.downcast_ref::<ProbeError>(),
            Some(ProbeError::Rejected)
        ));
        assert!(!closer.should_close(instant_now() + Duration::from_secs(5)));

        assert_request_eq!(handle, "first").send_response("ok");
        assert_eq!(assert_ready_ok!(first.poll()), "ok");

        // The success raised the rate to five per second, so a quarter second earns a token.
        time::advance(Duration::from_millis(250)).await;
        assert_ready_ok!(svc.poll_ready());
        let mut third = task::spawn(svc.call("third"));
        assert_request_eq!(handle, "third").send_response("ok");
        assert_eq!(assert_ready_ok!(third.poll()), "ok");
    }

    #[test]
    fn default_logic_counts_errors_as_failures() {
        #[derive(Clone)]
        struct Defaults;

        impl ProbeLogic for Defaults {
            type Error = Error;
            type Response = ();
        }

        let error: Error = Box::new(SvcError(false));
        assert_eq!(Defaults.classify_error(&error), ErrorKind::Failure);
        assert_eq!(Defaults.classify_response(&()), None);
    }

    #[derive(Debug, Clone)]
    struct SvcProbeLogic;

    impl ProbeLogic for SvcProbeLogic {
        type Error = Error;
        type Response = &'static str;

        fn classify_error(&self, error: &Self::Error) -> ErrorKind {
            match error.downcast_ref::<SvcError>() {
                Some(SvcError(true)) => ErrorKind::Failure,
                _ => ErrorKind::BadRequest,
            }
        }

        fn classify_response(&self, response: &Self::Response) -> Option<ErrorKind> {
            (*response == "overloaded").then_some(ErrorKind::Failure)
        }
    }

    #[derive(Debug)]
    struct SvcError(bool);

    impl fmt::Display for SvcError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "error")
        }
    }

    impl std::error::Error for SvcError {}
}
