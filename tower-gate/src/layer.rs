use std::sync::Arc;

use tower::Layer;

use flow_gate::{FlowGate, ResourceId};

use crate::service::GateService;

/// Applies flow-gate admission to requests.
///
/// The layer gates every request on a single resource. By default the
/// per-request context is named after the resource; callers fronting several
/// upstreams can tag the origin so origin-targeted rules apply.
#[derive(Clone)]
pub struct GateLayer {
    gate: Arc<FlowGate>,
    resource: ResourceId,
    context_name: String,
    origin: String,
}

impl GateLayer {
    pub fn new(gate: Arc<FlowGate>, resource: impl Into<ResourceId>) -> Self {
        let resource = resource.into();
        let context_name = resource.name().to_owned();
        Self {
            gate,
            resource,
            context_name,
            origin: String::new(),
        }
    }

    /// Names the context opened for each request. CHAIN-strategy rules match
    /// against this name.
    pub fn with_context_name(mut self, name: impl Into<String>) -> Self {
        self.context_name = name.into();
        self
    }

    /// Identifies the upstream caller, enabling rules that target a specific
    /// origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }
}

impl<S> Layer<S> for GateLayer {
    type Service = GateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GateService::new(
            inner,
            Arc::clone(&self.gate),
            self.resource.clone(),
            self.context_name.clone(),
            self.origin.clone(),
        )
    }
}
