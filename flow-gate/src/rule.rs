use std::sync::Arc;

use quanta::Clock;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::controller::{DefaultController, FlowController};
use crate::error::FlowError;
use crate::node::{StatNode, StatsRegistry};
use crate::rule_manager::RuleManager;
use crate::warm_up::{WarmUpController, DEFAULT_COLD_FACTOR};

/// Reserved `limit_app` value matching any caller.
pub const LIMIT_APP_DEFAULT: &str = "default";
/// Reserved `limit_app` value matching callers not named by any other rule on
/// the same resource.
pub const LIMIT_APP_OTHER: &str = "other";

/// Threshold type of a rule. Encodes as 0 = thread count, 1 = QPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Grade {
    Thread,
    #[default]
    Qps,
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> u8 {
        match grade {
            Grade::Thread => 0,
            Grade::Qps => 1,
        }
    }
}

impl TryFrom<u8> for Grade {
    type Error = FlowError;

    fn try_from(value: u8) -> Result<Self, FlowError> {
        match value {
            0 => Ok(Self::Thread),
            1 => Ok(Self::Qps),
            other => Err(FlowError::InvalidRule(format!("unknown grade {other}"))),
        }
    }
}

/// Which statistics node a rule meters against, relative to the call.
/// Encodes as 0 = direct, 1 = related resource, 2 = chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RelationStrategy {
    #[default]
    Direct,
    Relate,
    Chain,
}

impl From<RelationStrategy> for u8 {
    fn from(strategy: RelationStrategy) -> u8 {
        match strategy {
            RelationStrategy::Direct => 0,
            RelationStrategy::Relate => 1,
            RelationStrategy::Chain => 2,
        }
    }
}

impl TryFrom<u8> for RelationStrategy {
    type Error = FlowError;

    fn try_from(value: u8) -> Result<Self, FlowError> {
        match value {
            0 => Ok(Self::Direct),
            1 => Ok(Self::Relate),
            2 => Ok(Self::Chain),
            other => Err(FlowError::InvalidRule(format!("unknown strategy {other}"))),
        }
    }
}

/// Shaping behavior applied when traffic reaches the threshold.
/// Encodes as 0 = default, 1 = warm up, 2 = rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ControlBehavior {
    #[default]
    Default,
    WarmUp,
    RateLimiter,
}

impl From<ControlBehavior> for u8 {
    fn from(behavior: ControlBehavior) -> u8 {
        match behavior {
            ControlBehavior::Default => 0,
            ControlBehavior::WarmUp => 1,
            ControlBehavior::RateLimiter => 2,
        }
    }
}

impl TryFrom<u8> for ControlBehavior {
    type Error = FlowError;

    fn try_from(value: u8) -> Result<Self, FlowError> {
        match value {
            0 => Ok(Self::Default),
            1 => Ok(Self::WarmUp),
            2 => Ok(Self::RateLimiter),
            other => Err(FlowError::InvalidRule(format!(
                "unknown control behavior {other}"
            ))),
        }
    }
}

/// A declarative flow-control condition on one resource.
///
/// The field encoding (camelCase names, numeric enums, defaults) is
/// wire-compatible with rule payloads produced by other language ports, so
/// rules can be shipped through a shared configuration channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowRule {
    /// Name of the protected resource this rule applies to.
    pub resource: String,
    /// Which caller the rule targets: a concrete origin, "default", or
    /// "other".
    pub limit_app: String,
    pub grade: Grade,
    /// The admission threshold, in QPS or concurrent calls depending on
    /// `grade`.
    pub count: f64,
    pub strategy: RelationStrategy,
    /// Resource (RELATE) or context (CHAIN) name the strategy refers to.
    pub ref_resource: String,
    pub control_behavior: ControlBehavior,
    pub warm_up_period_sec: u32,
    /// Queueing budget for pacing behaviors. Kept for wire compatibility;
    /// the core itself never queues.
    pub max_queueing_time_ms: u32,
}

impl Default for FlowRule {
    fn default() -> Self {
        Self {
            resource: String::new(),
            limit_app: LIMIT_APP_DEFAULT.to_owned(),
            grade: Grade::default(),
            count: 0.0,
            strategy: RelationStrategy::default(),
            ref_resource: String::new(),
            control_behavior: ControlBehavior::default(),
            warm_up_period_sec: 10,
            max_queueing_time_ms: 500,
        }
    }
}

impl FlowRule {
    pub(crate) fn validate(&self) -> Result<(), FlowError> {
        if self.resource.is_empty() {
            return Err(FlowError::InvalidRule(
                "rule resource must not be empty".to_owned(),
            ));
        }
        if !self.count.is_finite() || self.count < 0.0 {
            return Err(FlowError::InvalidRule(format!(
                "rule count must be a non-negative number, got {}",
                self.count
            )));
        }
        Ok(())
    }

    fn build_controller(&self, clock: &Clock) -> Result<FlowController, FlowError> {
        if self.grade == Grade::Qps && self.control_behavior == ControlBehavior::WarmUp {
            let controller = WarmUpController::with_clock(
                self.count,
                self.warm_up_period_sec,
                DEFAULT_COLD_FACTOR,
                clock.clone(),
            )?;
            return Ok(FlowController::WarmUp(controller));
        }
        // Pacing (RateLimiter) is an outer-layer concern; at this level the
        // threshold comparison applies.
        Ok(FlowController::Default(DefaultController::new(
            self.count, self.grade,
        )))
    }
}

/// A rule bound to its materialized controller, ready for checking.
#[derive(Debug)]
pub struct LoadedRule {
    rule: Arc<FlowRule>,
    controller: FlowController,
}

impl LoadedRule {
    pub(crate) fn new(rule: FlowRule, clock: &Clock) -> Result<Self, FlowError> {
        rule.validate()?;
        let controller = rule.build_controller(clock)?;
        Ok(Self {
            rule: Arc::new(rule),
            controller,
        })
    }

    pub fn rule(&self) -> &Arc<FlowRule> {
        &self.rule
    }

    /// Whether `acquire` more calls may pass under this rule.
    ///
    /// Selects the statistics node the rule applies to; when no node matches
    /// (the rule does not apply to this call) the call is admitted.
    pub fn pass_check(
        &self,
        ctx: &Context,
        node: &Arc<dyn StatNode>,
        acquire: u32,
        stats: &dyn StatsRegistry,
        manager: &RuleManager,
    ) -> bool {
        match self.select_node(ctx, node, stats, manager) {
            None => true,
            Some(selected) => self.controller.can_pass(selected.as_ref(), acquire),
        }
    }

    /// Node selection driven by (limit_app, origin, strategy, ref_resource).
    fn select_node(
        &self,
        ctx: &Context,
        node: &Arc<dyn StatNode>,
        stats: &dyn StatsRegistry,
        manager: &RuleManager,
    ) -> Option<Arc<dyn StatNode>> {
        let limit_app = self.rule.limit_app.as_str();
        let origin = ctx.origin();

        if limit_app == origin {
            match self.rule.strategy {
                RelationStrategy::Direct => ctx.origin_node(),
                _ => self.related_node(ctx, node, stats),
            }
        } else if limit_app == LIMIT_APP_DEFAULT {
            match self.rule.strategy {
                RelationStrategy::Direct => node.cluster_node(),
                _ => self.related_node(ctx, node, stats),
            }
        } else if limit_app == LIMIT_APP_OTHER
            && manager.is_other_origin(origin, &self.rule.resource)
        {
            match self.rule.strategy {
                RelationStrategy::Direct => ctx.origin_node(),
                _ => self.related_node(ctx, node, stats),
            }
        } else {
            None
        }
    }

    fn related_node(
        &self,
        ctx: &Context,
        node: &Arc<dyn StatNode>,
        stats: &dyn StatsRegistry,
    ) -> Option<Arc<dyn StatNode>> {
        if self.rule.ref_resource.is_empty() {
            return None;
        }
        match self.rule.strategy {
            RelationStrategy::Relate => stats.cluster_node(&self.rule.ref_resource),
            RelationStrategy::Chain => {
                if self.rule.ref_resource == ctx.name() {
                    Some(Arc::clone(node))
                } else {
                    None
                }
            }
            RelationStrategy::Direct => None,
        }
    }
}
