use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use quanta::Clock;

use crate::error::FlowError;
use crate::rule::{FlowRule, LoadedRule};

type RuleTable = HashMap<String, Arc<Vec<Arc<LoadedRule>>>>;

/// Holds the current rule set, keyed by resource name.
///
/// Reads are lock-free snapshot loads so in-flight admission checks always
/// see a coherent rule list; reloads publish a whole new table. Controllers
/// are materialized once per load, so warm-up token state survives exactly as
/// long as its rule does.
pub struct RuleManager {
    table: ArcSwap<RuleTable>,
    write_lock: Mutex<()>,
    clock: Clock,
}

impl RuleManager {
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    /// Uses the given clock for every controller materialized by this
    /// manager. Deterministic tests pass a mock here.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            table: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
            clock,
        }
    }

    /// Replaces the entire rule set.
    ///
    /// Validation happens before publication: if any rule is invalid the
    /// previous rule set stays in effect.
    pub fn load_rules(&self, rules: Vec<FlowRule>) -> Result<(), FlowError> {
        let staged = self.build_table(rules)?;
        let _guard = self.write_lock.lock();
        let loaded: usize = staged.values().map(|v| v.len()).sum();
        self.table.store(Arc::new(staged));
        tracing::debug!(rules = loaded, "flow rules reloaded");
        Ok(())
    }

    /// Adds rules on top of the current set without touching existing ones.
    pub fn append_rules(&self, rules: Vec<FlowRule>) -> Result<(), FlowError> {
        let staged = self.build_table(rules)?;
        let _guard = self.write_lock.lock();
        let current = self.table.load_full();
        let mut next: RuleTable = (*current).clone();
        for (resource, additions) in staged {
            let slot = next.entry(resource).or_insert_with(|| Arc::new(Vec::new()));
            let mut merged: Vec<Arc<LoadedRule>> = slot.iter().cloned().collect();
            merged.extend(additions.iter().cloned());
            *slot = Arc::new(merged);
        }
        self.table.store(Arc::new(next));
        Ok(())
    }

    fn build_table(&self, rules: Vec<FlowRule>) -> Result<RuleTable, FlowError> {
        let mut staged: HashMap<String, Vec<Arc<LoadedRule>>> = HashMap::new();
        for rule in rules {
            let loaded = LoadedRule::new(rule, &self.clock)?;
            staged
                .entry(loaded.rule().resource.clone())
                .or_default()
                .push(Arc::new(loaded));
        }
        Ok(staged
            .into_iter()
            .map(|(resource, list)| (resource, Arc::new(list)))
            .collect())
    }

    /// The current rules for a resource, if any.
    pub fn rules_for(&self, resource: &str) -> Option<Arc<Vec<Arc<LoadedRule>>>> {
        self.table.load().get(resource).cloned()
    }

    /// Whether `origin` is *not* named by any rule on `resource`. Rules with
    /// `limit_app = "other"` only apply to such origins.
    pub fn is_other_origin(&self, origin: &str, resource: &str) -> bool {
        if origin.is_empty() {
            return false;
        }
        match self.table.load().get(resource) {
            None => true,
            Some(rules) => !rules.iter().any(|r| r.rule().limit_app == origin),
        }
    }
}

impl Default for RuleManager {
    fn default() -> Self {
        Self::new()
    }
}
