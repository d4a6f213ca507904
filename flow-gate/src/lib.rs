//! # flow-gate
//!
//! `flow-gate` is an in-process guard that decides, on every call to a named
//! resource, whether the call is admitted or rejected, based on configured
//! rules: QPS thresholds, concurrency thresholds, warm-up shaping, and
//! relational strategies between resources.
//!
//! ## Core Philosophy
//!
//! The admission path must be cheaper than the work it protects. Chain
//! lookups are lock-free snapshot reads, warm-up token state is two atomic
//! cells updated by CAS, and the only lock on the hot path is the
//! per-context stack mutex, which is never contended because contexts are
//! confined to one logical invocation.
//!
//! The guard must also never take its host down: an explicit rule denial is
//! the *only* reason a call is refused. Internal faults during slot
//! evaluation are logged and the call is admitted.
//!
//! ## Key Concepts
//!
//! * **Resource**: a named unit of work under protection. Each distinct
//!   resource is bound once to a shared pipeline of [`Slot`]s.
//! * **Entry / Context**: every admitted call holds an [`Entry`]; entries
//!   nest per [`Context`] and must exit in reverse order.
//! * **Rule / Controller**: a [`FlowRule`] declares a threshold; its
//!   [`FlowController`] (plain threshold or [`WarmUpController`]) makes the
//!   per-call decision against externally collected statistics.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flow_gate::{FlowGate, FlowRule};
//!
//! let gate = Arc::new(FlowGate::new(stats));
//! gate.rules().load_rules(vec![FlowRule {
//!     resource: "db.query".into(),
//!     count: 100.0,
//!     ..FlowRule::default()
//! }])?;
//!
//! match gate.entry("db.query") {
//!     Ok(entry) => {
//!         // protected work...
//!         entry.exit()?;
//!     }
//!     Err(blocked) => {
//!         // shed the call
//!     }
//! }
//! ```
//!
//! Statistics collection is not part of this crate: the embedder supplies a
//! [`StatsRegistry`] whose [`StatNode`]s report admitted QPS per second.

pub mod context;
mod controller;
mod engine;
mod entry;
mod error;
mod flow_slot;
mod node;
mod registry;
mod resource;
mod rule;
mod rule_manager;
mod slot;
mod warm_up;

pub use context::Context;
pub use controller::{DefaultController, FlowController};
pub use engine::{FlowGate, CONTEXT_DEFAULT_NAME};
pub use entry::Entry;
pub use error::FlowError;
pub use flow_slot::{DefaultChainBuilder, FlowSlot};
pub use node::{StatNode, StatsRegistry};
pub use registry::{ChainRegistry, MAX_SLOT_CHAIN_SIZE};
pub use resource::{ResourceId, ResourceKind, TrafficType};
pub use rule::{
    ControlBehavior, FlowRule, Grade, LoadedRule, RelationStrategy, LIMIT_APP_DEFAULT,
    LIMIT_APP_OTHER,
};
pub use rule_manager::RuleManager;
pub use slot::{ChainBuilder, Slot, SlotChain};
pub use warm_up::{WarmUpController, DEFAULT_COLD_FACTOR};
