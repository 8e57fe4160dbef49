use std::sync::Arc;

use tower::Layer;

use super::{Aimd, ProbeCloser, service::ProbeService};

/// Wraps services in a [`ProbeService`] sharing one [`ProbeCloser`].
pub struct ProbeLayer<L, C = Aimd> {
    closer: Arc<ProbeCloser<C>>,
    logic: L,
}

impl<L, C> ProbeLayer<L, C> {
    pub const fn new(closer: Arc<ProbeCloser<C>>, logic: L) -> Self {
        Self { closer, logic }
    }
}

impl<L: Clone, C> Clone for ProbeLayer<L, C> {
    fn clone(&self) -> Self {
        Self {
            closer: Arc::clone(&self.closer),
            logic: self.logic.clone(),
        }
    }
}

impl<S, L: Clone, C> Layer<S> for ProbeLayer<L, C> {
    type Service = ProbeService<S, L, C>;

    fn layer(&self, inner: S) -> Self::Service {
        ProbeService::new(inner, Arc::clone(&self.closer), self.logic.clone())
    }
}
