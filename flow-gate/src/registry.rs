use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::resource::ResourceId;
use crate::slot::{ChainBuilder, SlotChain};

/// Hard cap on distinct resources under rule checking. Calls for resources
/// beyond this bound bypass the pipeline entirely.
pub const MAX_SLOT_CHAIN_SIZE: usize = 6000;

type ChainTable = HashMap<ResourceId, Arc<SlotChain>>;

/// Interns one slot chain per unique resource.
///
/// Lookups on the hot path are lock-free loads of an immutable snapshot; the
/// only writers are first-time resource insertions, which copy the table,
/// insert, and publish the new snapshot under a single lock. The table is
/// append-only: once a resource is bound to a chain, the binding never
/// changes for the life of the process.
pub struct ChainRegistry {
    chains: ArcSwap<ChainTable>,
    build_lock: Mutex<()>,
    builder: Box<dyn ChainBuilder>,
}

impl ChainRegistry {
    pub fn new(builder: Box<dyn ChainBuilder>) -> Self {
        Self {
            chains: ArcSwap::from_pointee(HashMap::new()),
            build_lock: Mutex::new(()),
            builder,
        }
    }

    /// The chain bound to `resource`, building and interning it on first
    /// sight. Returns `None` once the registry holds
    /// [`MAX_SLOT_CHAIN_SIZE`] chains.
    pub fn look_chain(&self, resource: &ResourceId) -> Option<Arc<SlotChain>> {
        if let Some(chain) = self.chains.load().get(resource) {
            return Some(Arc::clone(chain));
        }

        let _guard = self.build_lock.lock();
        // Re-check: another thread may have built the chain while we waited.
        let current = self.chains.load_full();
        if let Some(chain) = current.get(resource) {
            return Some(Arc::clone(chain));
        }
        if current.len() >= MAX_SLOT_CHAIN_SIZE {
            return None;
        }

        let chain = Arc::new(self.builder.build());
        let mut next: ChainTable = HashMap::with_capacity(current.len() + 1);
        next.extend(
            current
                .iter()
                .map(|(res, chain)| (res.clone(), Arc::clone(chain))),
        );
        next.insert(resource.clone(), Arc::clone(&chain));
        let size = next.len();
        self.chains.store(Arc::new(next));
        tracing::debug!(resource = %resource, size, "bound new slot chain");
        Some(chain)
    }

    /// Number of bound chains. Monotonically non-decreasing.
    pub fn len(&self) -> usize {
        self.chains.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[derive(Debug)]
    struct EmptyChainBuilder;

    impl ChainBuilder for EmptyChainBuilder {
        fn build(&self) -> SlotChain {
            SlotChain::default()
        }
    }

    #[test]
    fn binds_each_resource_exactly_once() {
        let registry = ChainRegistry::new(Box::new(EmptyChainBuilder));
        let resource = ResourceId::outbound("api");

        let first = registry.look_chain(&resource).unwrap();
        let second = registry.look_chain(&resource).unwrap();
        assert!(
            Arc::ptr_eq(&first, &second),
            "same resource must share one chain"
        );
        assert_eq!(registry.len(), 1);

        let other = registry.look_chain(&ResourceId::outbound("db")).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_first_lookups_agree_on_one_chain() {
        let registry = Arc::new(ChainRegistry::new(Box::new(EmptyChainBuilder)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry
                        .look_chain(&ResourceId::outbound("shared"))
                        .unwrap()
                })
            })
            .collect();

        let chains: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(chains.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn traffic_type_distinguishes_resources() {
        let registry = ChainRegistry::new(Box::new(EmptyChainBuilder));

        let inbound = registry.look_chain(&ResourceId::inbound("api")).unwrap();
        let outbound = registry.look_chain(&ResourceId::outbound("api")).unwrap();
        assert!(!Arc::ptr_eq(&inbound, &outbound));
        assert_eq!(registry.len(), 2);
    }
}
