use std::sync::Arc;

use crate::rule::FlowRule;

/// Errors surfaced by the admission pipeline.
///
/// Only `Blocked` means "the call was denied by a rule". Everything else is
/// either a configuration problem reported at rule load time, or a pairing
/// problem reported at exit time after the library has already repaired its
/// own state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlowError {
    /// A flow rule denied the call. Carries the rule that fired.
    #[error("flow rule rejected resource {resource:?}")]
    Blocked {
        /// Name of the resource the entry was requested for.
        resource: String,
        /// The rule whose threshold was exceeded.
        rule: Arc<FlowRule>,
    },

    /// `exit` was called on an entry that is not the top of its context's
    /// call stack. All open entries in the context have been force-exited;
    /// the caller's call graph is considered corrupt.
    #[error("entries exited out of order; all open entries were force-exited")]
    UnpairedExit,

    /// A rule or controller was constructed with invalid parameters.
    #[error("invalid rule: {0}")]
    InvalidRule(String),
}

impl FlowError {
    /// Whether this error is a block signal (as opposed to an internal or
    /// configuration failure).
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    /// The rule that denied the call, if this is a block signal.
    pub fn blocked_rule(&self) -> Option<&Arc<FlowRule>> {
        match self {
            Self::Blocked { rule, .. } => Some(rule),
            _ => None,
        }
    }
}
