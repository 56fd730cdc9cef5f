use std::fmt;

use crate::{ExecutionSession, RESULT_ABORTED};

/// How a confirmed cancellation request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Canceled,
    /// The job reached a terminal state before the cancel request landed.
    AlreadyExecuted { status: String },
    CancelFailed { reason: String },
    /// Interrupted while nothing was being watched.
    Interrupted,
}

impl fmt::Display for CancelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelOutcome::Canceled => write!(f, "Canceled"),
            CancelOutcome::AlreadyExecuted { status } => {
                write!(f, "Job already has been executed, status: {status}")
            }
            CancelOutcome::CancelFailed { reason } => {
                write!(f, "failed to cancel job, error {reason}")
            }
            CancelOutcome::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// Which server-side requests a cancellation needs for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelPlan {
    pub job: String,
    pub cancel_queue: Option<u64>,
    pub stop_build: Option<u64>,
    /// Queue entry whose fate must be looked up in the build history,
    /// because no build number was known when the request was made.
    pub verify_queue: Option<u64>,
}

impl CancelPlan {
    pub fn for_session(session: &ExecutionSession) -> Option<Self> {
        if !session.is_active() {
            return None;
        }
        let nonzero = |id: u64| (id != 0).then_some(id);
        Some(Self {
            job: session.job.clone(),
            cancel_queue: nonzero(session.queue_id),
            stop_build: nonzero(session.build_number),
            verify_queue: session.is_queued_only().then_some(session.queue_id),
        })
    }
}

/// Outcome after stopping a running build, given the status read back.
pub fn outcome_from_stop(status: &str) -> CancelOutcome {
    if status == RESULT_ABORTED {
        CancelOutcome::Canceled
    } else {
        CancelOutcome::AlreadyExecuted {
            status: status.to_string(),
        }
    }
}

/// A recent build of the job, as far as cancel verification cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub number: u64,
    pub queue_id: u64,
    pub building: bool,
    pub result: Option<String>,
}

/// What became of a cancelled queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueFate {
    /// No recent build came from the entry.
    NeverRan,
    /// An executor picked the entry up and the build is still going; it
    /// has to be stopped.
    Running { number: u64 },
    Settled(CancelOutcome),
}

/// Looks up a cancelled queue entry in the job's recent builds.
pub fn queue_fate<'a>(
    queue_id: u64,
    history: impl IntoIterator<Item = &'a HistoryEntry>,
) -> QueueFate {
    let Some(entry) = history.into_iter().find(|entry| entry.queue_id == queue_id) else {
        return QueueFate::NeverRan;
    };
    match entry.result.as_deref() {
        Some(status) if !entry.building => QueueFate::Settled(outcome_from_stop(status)),
        _ => QueueFate::Running {
            number: entry.number,
        },
    }
}
