use std::fmt::Debug;
use std::sync::Arc;

use crate::resource::ResourceId;

/// Read side of the statistics a controller meters against.
///
/// Statistics collection itself (sliding-window counters and their rollover)
/// lives outside this crate; the admission pipeline only ever reads through
/// this trait. Implementations must be cheap and non-blocking: these methods
/// sit on the hot path of every guarded call.
pub trait StatNode: Debug + Send + Sync {
    /// Calls admitted in the current second.
    fn pass_qps(&self) -> u64;

    /// Calls admitted in the previous second.
    fn previous_pass_qps(&self) -> u64;

    /// The aggregated node for this resource across all contexts.
    fn cluster_node(&self) -> Option<Arc<dyn StatNode>>;

    /// In-flight calls on this node right now. Only consulted by
    /// concurrency-grade rules; defaults to 0 for collectors that do not
    /// track it.
    fn current_concurrency(&self) -> u32 {
        0
    }
}

/// Source of statistics nodes for the admission pipeline.
///
/// Implemented by the embedding application (or its metrics layer). The
/// pipeline asks for one node per (resource, context) pair to thread through
/// the slot chain, resolves relation rules through [`cluster_node`], and
/// optionally attaches a per-origin node to new contexts.
///
/// [`cluster_node`]: StatsRegistry::cluster_node
pub trait StatsRegistry: Send + Sync {
    /// The node the slot chain meters against for one (resource, context)
    /// pair.
    fn node(&self, resource: &ResourceId, context_name: &str) -> Arc<dyn StatNode>;

    /// The aggregated per-resource node, looked up by resource name. Used by
    /// RELATE-strategy rules.
    fn cluster_node(&self, resource_name: &str) -> Option<Arc<dyn StatNode>>;

    /// A per-origin node for a named context entrance. Rules that target a
    /// specific caller meter against this.
    fn origin_node(&self, _context_name: &str, _origin: &str) -> Option<Arc<dyn StatNode>> {
        None
    }
}
