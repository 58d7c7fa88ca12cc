// src/scheduler/scheduler_step.rs

//! Result of handling a single queue item.

/// What one scheduler iteration did.
///
/// Tests step the scheduler by hand and assert on these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerStep {
    /// Nothing was eligible.
    Idle,
    /// Marked `scheduled` and handed to the transport.
    Dispatched { liveaction_id: String },
    /// A policy (or a busy resource lock) moved it to `delayed`.
    Delayed { liveaction_id: String },
    /// A policy canceled it.
    Canceled { liveaction_id: String },
    /// Dispatch or scheduling failed; a fresh request was enqueued.
    Requeued { liveaction_id: String },
    /// The liveaction was already completed; the request was discarded.
    Dropped { liveaction_id: String },
}

impl SchedulerStep {
    pub fn is_idle(&self) -> bool {
        matches!(self, SchedulerStep::Idle)
    }

    pub fn liveaction_id(&self) -> Option<&str> {
        match self {
            SchedulerStep::Idle => None,
            SchedulerStep::Dispatched { liveaction_id }
            | SchedulerStep::Delayed { liveaction_id }
            | SchedulerStep::Canceled { liveaction_id }
            | SchedulerStep::Requeued { liveaction_id }
            | SchedulerStep::Dropped { liveaction_id } => Some(liveaction_id),
        }
    }
}
