use slog::{
    debug,
    Logger,
};

use crate::{
    errors::HandlerError,
    handlers::{
        handle_event,
        Context,
    },
    primitives::BlockNumber,
};

/// Releases scheduled events once the chain has confirmed their trigger
/// block. Only the boundary matters: an event whose trigger is far in the
/// past (service offline) fires exactly once, immediately, without
/// replaying the blocks in between.
pub struct Scheduler {
    log: Logger,
}

impl Scheduler {
    pub fn new(log: Logger) -> Self {
        Self { log }
    }

    /// Dispatches every pending event with trigger ≤ `head` through the
    /// normal handler table, FIFO per equal trigger height, and removes it.
    /// Runs inside the caller's storage transaction, so a dispatch that
    /// fails rolls back together with the removal. Dispatch works off a
    /// single snapshot of the due events: anything scheduled while
    /// dispatching, such as a submission retry, stays in the table for a
    /// later pass instead of re-firing in the same one.
    pub async fn release_due(&self, context: &Context, head: BlockNumber) -> Result<usize, HandlerError> {
        let due = context.storage.due_scheduled_events(head)?;
        let mut dispatched = 0;
        for (identifier, scheduled) in due {
            context.storage.remove_scheduled_event(identifier)?;
            debug!(self.log, "Dispatching scheduled event";
                "trigger_block" => scheduled.trigger_block_number.as_u64(),
                "head" => head.as_u64());
            handle_event(context, scheduled.event).await?;
            dispatched += 1;
        }
        Ok(dispatched)
    }
}
