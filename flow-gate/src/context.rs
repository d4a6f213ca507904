//! Per-invocation contexts and the thread-local current-context slot.
//!
//! A context owns the call stack of its in-flight entries. It must stay
//! confined to one logical invocation: the library never shares a context
//! across concurrent callers, and the thread-local helpers here enforce that
//! for the common case. Adapters that move a request between threads create
//! one context per request and pass it explicitly instead.

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::node::StatNode;
use crate::resource::ResourceId;
use crate::slot::SlotChain;

const NULL_CONTEXT_NAME: &str = "null_context_internal";

/// A per-invocation container holding the caller's origin and the stack of
/// active entries.
#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) shared: Arc<ContextShared>,
}

#[derive(Debug)]
pub(crate) struct ContextShared {
    name: String,
    origin: String,
    origin_node: Option<Arc<dyn StatNode>>,
    null: bool,
    pub(crate) stack: Mutex<CallStack>,
}

#[derive(Debug, Default)]
pub(crate) struct CallStack {
    pub(crate) frames: Vec<Frame>,
    pub(crate) next_token: u64,
}

/// One open entry on the stack.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) token: u64,
    pub(crate) resource: ResourceId,
    pub(crate) chain: Option<Arc<SlotChain>>,
    pub(crate) acquire: u32,
}

impl Context {
    pub fn new(name: impl Into<String>, origin: impl Into<String>) -> Self {
        Self::build(name.into(), origin.into(), None, false)
    }

    /// A context with a pre-resolved statistics node for its origin.
    pub fn with_origin_node(
        name: impl Into<String>,
        origin: impl Into<String>,
        origin_node: Arc<dyn StatNode>,
    ) -> Self {
        Self::build(name.into(), origin.into(), Some(origin_node), false)
    }

    /// The sentinel context: entries created under it skip all rule checking
    /// while keeping the usual stack discipline.
    pub fn null() -> Self {
        Self::build(NULL_CONTEXT_NAME.to_owned(), String::new(), None, true)
    }

    fn build(
        name: String,
        origin: String,
        origin_node: Option<Arc<dyn StatNode>>,
        null: bool,
    ) -> Self {
        Self {
            shared: Arc::new(ContextShared {
                name,
                origin,
                origin_node,
                null,
                stack: Mutex::new(CallStack::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn origin(&self) -> &str {
        &self.shared.origin
    }

    pub fn origin_node(&self) -> Option<Arc<dyn StatNode>> {
        self.shared.origin_node.clone()
    }

    pub fn is_null(&self) -> bool {
        self.shared.null
    }

    /// Number of entries currently open in this context.
    pub fn depth(&self) -> usize {
        self.shared.stack.lock().frames.len()
    }

    /// The resource of the current (innermost) entry, if any.
    pub fn current_resource(&self) -> Option<ResourceId> {
        self.shared
            .stack
            .lock()
            .frames
            .last()
            .map(|frame| frame.resource.clone())
    }

    pub(crate) fn same(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// The context bound to this thread, if any.
pub fn current() -> Option<Context> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Binds `ctx` as this thread's current context, replacing any previous one.
pub fn set_current(ctx: Context) {
    CURRENT.with(|slot| *slot.borrow_mut() = Some(ctx));
}

/// Unbinds this thread's current context.
pub fn exit() {
    CURRENT.with(|slot| *slot.borrow_mut() = None);
}

/// Clears the slot only if it still holds `ctx`. Called when a context's
/// outermost entry exits, possibly from a different thread than the one the
/// context was bound on; in that case this is a no-op there.
pub(crate) fn clear_if_current(ctx: &Context) {
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.as_ref().is_some_and(|current| current.same(ctx)) {
            *slot = None;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_local_slot_round_trips() {
        assert!(current().is_none());

        let ctx = Context::new("ctx", "caller");
        set_current(ctx.clone());
        let fetched = current().unwrap();
        assert!(fetched.same(&ctx));
        assert_eq!(fetched.origin(), "caller");

        exit();
        assert!(current().is_none());
    }

    #[test]
    fn clear_if_current_ignores_other_contexts() {
        let bound = Context::new("bound", "");
        set_current(bound.clone());

        clear_if_current(&Context::new("bound", ""));
        assert!(current().is_some(), "identity is by pointer, not by name");

        clear_if_current(&bound);
        assert!(current().is_none());
    }

    #[test]
    fn null_context_is_flagged() {
        assert!(Context::null().is_null());
        assert!(!Context::new("ctx", "").is_null());
    }
}
