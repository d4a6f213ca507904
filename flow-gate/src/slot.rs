use std::fmt::Debug;
use std::sync::Arc;

use crate::context::Context;
use crate::error::FlowError;
use crate::node::StatNode;
use crate::resource::ResourceId;

/// One stage of the per-resource processing pipeline.
///
/// Slots see every entry and exit for the resource their chain is bound to.
/// `on_entry` may deny the call by returning [`FlowError::Blocked`]; any
/// other error is treated as an internal fault and the call is admitted.
pub trait Slot: Debug + Send + Sync {
    fn on_entry(
        &self,
        ctx: &Context,
        resource: &ResourceId,
        node: &Arc<dyn StatNode>,
        acquire: u32,
    ) -> Result<(), FlowError>;

    fn on_exit(&self, ctx: &Context, resource: &ResourceId, acquire: u32);
}

/// An ordered pipeline of slots, built once per unique resource and shared
/// for the life of the process.
#[derive(Debug, Default)]
pub struct SlotChain {
    slots: Vec<Arc<dyn Slot>>,
}

impl SlotChain {
    pub fn new(slots: Vec<Arc<dyn Slot>>) -> Self {
        Self { slots }
    }

    /// Runs every slot in order; the first error stops the chain.
    pub fn entry(
        &self,
        ctx: &Context,
        resource: &ResourceId,
        node: &Arc<dyn StatNode>,
        acquire: u32,
    ) -> Result<(), FlowError> {
        for slot in &self.slots {
            slot.on_entry(ctx, resource, node, acquire)?;
        }
        Ok(())
    }

    pub fn exit(&self, ctx: &Context, resource: &ResourceId, acquire: u32) {
        for slot in &self.slots {
            slot.on_exit(ctx, resource, acquire);
        }
    }
}

/// Produces the slot chain bound to each newly seen resource.
pub trait ChainBuilder: Send + Sync {
    fn build(&self) -> SlotChain;
}
