use std::sync::Arc;

use crate::context::{self, Context, Frame};
use crate::error::FlowError;
use crate::resource::ResourceId;
use crate::slot::SlotChain;

/// The admission record for one in-flight call of a resource.
///
/// Entries form a strict LIFO stack per context: the entry obtained last must
/// exit first. Exiting out of order force-exits every open entry in the
/// context and reports [`FlowError::UnpairedExit`]; the library's own state
/// is repaired, the caller's call graph is not.
///
/// Dropping an entry without calling [`exit`](Self::exit) leaks the stack
/// frame until the context unwinds; exit is deliberately explicit so that
/// pairing bugs surface instead of being masked.
#[derive(Debug)]
pub struct Entry {
    ctx: Option<Context>,
    token: u64,
    resource: ResourceId,
    chain: Option<Arc<SlotChain>>,
}

enum ExitOutcome {
    /// This entry was the top of the stack; normal pop.
    Clean { frame: Frame, outermost: bool },
    /// This entry was buried: the whole stack was drained, innermost first.
    Unwind(Vec<Frame>),
    /// The frame is gone already (force-exited earlier); nothing to do.
    Absent,
}

impl Entry {
    /// Pushes a new frame onto the context's stack and returns its handle.
    pub(crate) fn push(
        ctx: &Context,
        resource: ResourceId,
        chain: Option<Arc<SlotChain>>,
        acquire: u32,
    ) -> Self {
        let token = {
            let mut stack = ctx.shared.stack.lock();
            let token = stack.next_token;
            stack.next_token += 1;
            stack.frames.push(Frame {
                token,
                resource: resource.clone(),
                chain: chain.clone(),
                acquire,
            });
            token
        };
        Self {
            ctx: Some(ctx.clone()),
            token,
            resource,
            chain,
        }
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Whether this entry skipped rule checking (null context, global switch
    /// off, or registry cap reached).
    pub fn bypassed(&self) -> bool {
        self.chain.is_none()
    }

    /// Closes this entry, running the chain's exit stage and popping the
    /// context's call stack.
    ///
    /// When this entry is the outermost one, the context is destroyed (its
    /// thread-local binding is cleared if it owns one). Exiting an entry that
    /// was already force-exited is a no-op.
    ///
    /// # Errors
    ///
    /// [`FlowError::UnpairedExit`] if this entry was not the current one;
    /// every intervening entry has been force-exited first.
    pub fn exit(mut self) -> Result<(), FlowError> {
        let Some(ctx) = self.ctx.take() else {
            return Ok(());
        };

        let outcome = {
            let mut stack = ctx.shared.stack.lock();
            match stack.frames.iter().position(|f| f.token == self.token) {
                None => ExitOutcome::Absent,
                Some(pos) if pos + 1 == stack.frames.len() => match stack.frames.pop() {
                    Some(frame) => ExitOutcome::Clean {
                        frame,
                        outermost: stack.frames.is_empty(),
                    },
                    None => ExitOutcome::Absent,
                },
                Some(_) => {
                    let mut drained: Vec<Frame> = stack.frames.drain(..).collect();
                    drained.reverse();
                    ExitOutcome::Unwind(drained)
                }
            }
        };

        match outcome {
            ExitOutcome::Absent => Ok(()),
            ExitOutcome::Clean { frame, outermost } => {
                if let Some(chain) = &frame.chain {
                    chain.exit(&ctx, &frame.resource, frame.acquire);
                }
                if outermost {
                    context::clear_if_current(&ctx);
                }
                Ok(())
            }
            ExitOutcome::Unwind(frames) => {
                for frame in frames {
                    if let Some(chain) = &frame.chain {
                        chain.exit(&ctx, &frame.resource, frame.acquire);
                    }
                }
                context::clear_if_current(&ctx);
                Err(FlowError::UnpairedExit)
            }
        }
    }
}
