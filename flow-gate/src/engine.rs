use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::context::{self, Context};
use crate::entry::Entry;
use crate::error::FlowError;
use crate::flow_slot::DefaultChainBuilder;
use crate::node::StatsRegistry;
use crate::registry::ChainRegistry;
use crate::resource::ResourceId;
use crate::rule_manager::RuleManager;
use crate::slot::ChainBuilder;

/// Name given to contexts auto-created when an entry is requested outside
/// any explicit context.
pub const CONTEXT_DEFAULT_NAME: &str = "sentinel_default_context";

/// The admission engine: binds resources to slot chains and drives per-call
/// entry/exit through them.
///
/// Create one per process and share it via `Arc`; all state that must be
/// process-wide (the chain registry, the rule set, the global switch) lives
/// here, so there are no hidden globals beyond the thread-local context
/// slot.
pub struct FlowGate {
    rules: Arc<RuleManager>,
    stats: Arc<dyn StatsRegistry>,
    registry: ChainRegistry,
    enabled: AtomicBool,
}

impl FlowGate {
    pub fn new(stats: Arc<dyn StatsRegistry>) -> Self {
        Self::with_rules(stats, Arc::new(RuleManager::new()))
    }

    /// Uses an externally owned rule manager, e.g. one shared with a
    /// configuration channel.
    pub fn with_rules(stats: Arc<dyn StatsRegistry>, rules: Arc<RuleManager>) -> Self {
        let builder = DefaultChainBuilder::new(Arc::clone(&rules), Arc::clone(&stats));
        Self::with_chain_builder(stats, rules, Box::new(builder))
    }

    /// Full control over the chain built for each resource.
    pub fn with_chain_builder(
        stats: Arc<dyn StatsRegistry>,
        rules: Arc<RuleManager>,
        builder: Box<dyn ChainBuilder>,
    ) -> Self {
        Self {
            rules,
            stats,
            registry: ChainRegistry::new(builder),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn rules(&self) -> &RuleManager {
        &self.rules
    }

    /// Global switch. While off, entries are handed out without any rule
    /// checking.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Number of resources currently bound to a chain.
    pub fn chain_count(&self) -> usize {
        self.registry.len()
    }

    /// Builds a context without binding it to the current thread. Adapters
    /// that carry a request across threads use this and
    /// [`entry_with`](Self::entry_with).
    pub fn new_context(&self, name: impl Into<String>, origin: impl Into<String>) -> Context {
        let name = name.into();
        let origin = origin.into();
        if origin.is_empty() {
            return Context::new(name, origin);
        }
        match self.stats.origin_node(&name, &origin) {
            Some(node) => Context::with_origin_node(name, origin, node),
            None => Context::new(name, origin),
        }
    }

    /// Binds a context to the current thread, or returns the one already
    /// bound.
    pub fn enter_context(
        &self,
        name: impl Into<String>,
        origin: impl Into<String>,
    ) -> Context {
        if let Some(existing) = context::current() {
            return existing;
        }
        let ctx = self.new_context(name, origin);
        context::set_current(ctx.clone());
        ctx
    }

    /// Requests admission for one call of `resource` under the current
    /// thread's context, auto-creating a default context if none is bound.
    ///
    /// # Errors
    ///
    /// [`FlowError::Blocked`] when a rule denies the call; the entry has
    /// already been unwound.
    pub fn entry(&self, resource: impl Into<ResourceId>) -> Result<Entry, FlowError> {
        self.entry_n(resource, 1)
    }

    /// [`entry`](Self::entry) acquiring `acquire` tokens at once.
    pub fn entry_n(
        &self,
        resource: impl Into<ResourceId>,
        acquire: u32,
    ) -> Result<Entry, FlowError> {
        let ctx = match context::current() {
            Some(ctx) => ctx,
            None => {
                let ctx = self.new_context(CONTEXT_DEFAULT_NAME, "");
                context::set_current(ctx.clone());
                ctx
            }
        };
        self.entry_with(&ctx, resource, acquire)
    }

    /// Requests admission under an explicit context.
    ///
    /// The entry skips rule checking (but still joins the context's call
    /// stack) when the context is the null sentinel, the global switch is
    /// off, or the chain registry is at capacity.
    pub fn entry_with(
        &self,
        ctx: &Context,
        resource: impl Into<ResourceId>,
        acquire: u32,
    ) -> Result<Entry, FlowError> {
        let resource = resource.into();
        let chain = if ctx.is_null() || !self.is_enabled() {
            None
        } else {
            self.registry.look_chain(&resource)
        };

        let entry = Entry::push(ctx, resource.clone(), chain.clone(), acquire);
        if let Some(chain) = chain {
            let node = self.stats.node(&resource, ctx.name());
            match chain.entry(ctx, &resource, &node, acquire) {
                Ok(()) => {}
                Err(err @ FlowError::Blocked { .. }) => {
                    // Unwind the entry we just opened, then surface the
                    // block signal.
                    let _ = entry.exit();
                    return Err(err);
                }
                Err(err) => {
                    // Fail open: the guard must never itself take the
                    // caller down.
                    tracing::info!(
                        resource = %resource,
                        error = %err,
                        "unexpected error during slot evaluation, admitting"
                    );
                }
            }
        }
        Ok(entry)
    }
}
