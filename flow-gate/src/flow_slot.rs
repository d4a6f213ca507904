use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::FlowError;
use crate::node::{StatNode, StatsRegistry};
use crate::resource::ResourceId;
use crate::rule_manager::RuleManager;
use crate::slot::{ChainBuilder, Slot, SlotChain};

/// The rule-checking stage of the chain.
///
/// Every rule on the resource is checked independently; the first denial
/// raises a block signal carrying the rule that fired.
pub struct FlowSlot {
    rules: Arc<RuleManager>,
    stats: Arc<dyn StatsRegistry>,
}

impl FlowSlot {
    pub fn new(rules: Arc<RuleManager>, stats: Arc<dyn StatsRegistry>) -> Self {
        Self { rules, stats }
    }
}

impl fmt::Debug for FlowSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowSlot").finish_non_exhaustive()
    }
}

impl Slot for FlowSlot {
    fn on_entry(
        &self,
        ctx: &Context,
        resource: &ResourceId,
        node: &Arc<dyn StatNode>,
        acquire: u32,
    ) -> Result<(), FlowError> {
        let Some(rules) = self.rules.rules_for(resource.name()) else {
            return Ok(());
        };
        for loaded in rules.iter() {
            if !loaded.pass_check(ctx, node, acquire, self.stats.as_ref(), &self.rules) {
                return Err(FlowError::Blocked {
                    resource: resource.name().to_owned(),
                    rule: Arc::clone(loaded.rule()),
                });
            }
        }
        Ok(())
    }

    fn on_exit(&self, _ctx: &Context, _resource: &ResourceId, _acquire: u32) {}
}

/// Builds the standard chain: currently just the flow slot.
pub struct DefaultChainBuilder {
    rules: Arc<RuleManager>,
    stats: Arc<dyn StatsRegistry>,
}

impl DefaultChainBuilder {
    pub fn new(rules: Arc<RuleManager>, stats: Arc<dyn StatsRegistry>) -> Self {
        Self { rules, stats }
    }
}

impl ChainBuilder for DefaultChainBuilder {
    fn build(&self) -> SlotChain {
        SlotChain::new(vec![Arc::new(FlowSlot::new(
            Arc::clone(&self.rules),
            Arc::clone(&self.stats),
        ))])
    }
}
