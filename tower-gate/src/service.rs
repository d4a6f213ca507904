use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::BoxError;
use tower::Service;

use flow_gate::{FlowGate, ResourceId};

use crate::GateError;

/// Admits or rejects each request through a [`FlowGate`] before handing it
/// to the inner service.
pub struct GateService<S> {
    inner: S,
    gate: Arc<FlowGate>,
    resource: ResourceId,
    context_name: String,
    origin: String,
}

impl<S: Clone> Clone for GateService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gate: Arc::clone(&self.gate),
            resource: self.resource.clone(),
            context_name: self.context_name.clone(),
            origin: self.origin.clone(),
        }
    }
}

impl<S> GateService<S> {
    pub fn new(
        inner: S,
        gate: Arc<FlowGate>,
        resource: ResourceId,
        context_name: String,
        origin: String,
    ) -> Self {
        Self {
            inner,
            gate,
            resource,
            context_name,
            origin,
        }
    }
}

impl<S, Req> Service<Req> for GateService<S>
where
    S: Service<Req, Error = BoxError>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    // Boxed because the exit must run after the inner future completes.
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        // One context per request: the request may hop threads, so the
        // thread-local context slot is not used here.
        let ctx = self
            .gate
            .new_context(self.context_name.clone(), self.origin.clone());

        match self.gate.entry_with(&ctx, self.resource.clone(), 1) {
            Err(err) => {
                let err: BoxError = Box::new(GateError::from(err));
                Box::pin(std::future::ready(Err(err)))
            }
            Ok(entry) => {
                let fut = self.inner.call(req);
                Box::pin(async move {
                    let result = fut.await;
                    // The per-request context holds exactly this entry, so
                    // the exit is always cleanly paired.
                    let _ = entry.exit();
                    result
                })
            }
        }
    }
}
