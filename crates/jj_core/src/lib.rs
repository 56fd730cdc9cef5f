//! jj core: pure watch logic, progress estimation and render reducer.
mod cancel;
mod chain;
mod pods;
mod post_check;
mod progress;
mod render;
mod selection;
mod session;

pub use cancel::{
    outcome_from_stop, queue_fate, CancelOutcome, CancelPlan, HistoryEntry, QueueFate,
};
pub use chain::{recent_build_numbers, ChainLink};
pub use pods::{
    choose_pods, matching_pods, picked_pods, pod_age_of, pod_name_of, PodChoice, PodTarget,
};
pub use post_check::{
    alternative_selectors, deployment_name_for_job, parse_pod_line, PodReadiness, PostCheckFilter,
    SubstringFilter, DEFAULT_SKIP_NEEDLES,
};
pub use progress::{ProgressDelta, ProgressEstimator, INITIAL_PERCENT, MAX_RUNNING_PERCENT};
pub use render::{update, BarCommand, FinishTag, RenderState, RenderUpdate, FAILED_MIN_LINES};
pub use selection::{
    choose_job, matching_jobs, parse_assignment, resolve_parameters, AssignmentError, JobChoice,
};
pub use session::ExecutionSession;

/// Result tag the build server reports for a successful build.
pub const RESULT_SUCCESS: &str = "SUCCESS";
/// Result tag the build server reports for an aborted build.
pub const RESULT_ABORTED: &str = "ABORTED";
