use crate::node::StatNode;
use crate::rule::Grade;
use crate::warm_up::WarmUpController;

/// The admission decision procedure materialized from a rule's control
/// behavior.
///
/// A closed set: rules compile to exactly one of these at load time, and the
/// flow slot only ever calls [`can_pass`](Self::can_pass).
#[derive(Debug)]
pub enum FlowController {
    /// Plain threshold comparison against QPS or in-flight calls.
    Default(DefaultController),
    /// Token-bucket warm-up shaping.
    WarmUp(WarmUpController),
}

impl FlowController {
    pub fn can_pass(&self, node: &dyn StatNode, acquire: u32) -> bool {
        match self {
            Self::Default(c) => c.can_pass(node, acquire),
            Self::WarmUp(c) => c.can_pass(node, acquire),
        }
    }
}

/// Admits while the metered quantity stays at or below the configured count.
#[derive(Debug)]
pub struct DefaultController {
    count: f64,
    grade: Grade,
}

impl DefaultController {
    pub fn new(count: f64, grade: Grade) -> Self {
        Self { count, grade }
    }

    pub fn can_pass(&self, node: &dyn StatNode, acquire: u32) -> bool {
        let used = match self.grade {
            Grade::Thread => u64::from(node.current_concurrency()),
            Grade::Qps => node.pass_qps(),
        };
        (used + u64::from(acquire)) as f64 <= self.count
    }
}
