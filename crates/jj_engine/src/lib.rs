//! jj engine: build-server client, watch loop and task orchestration.
mod cancel;
mod chain;
mod client;
mod console;
mod coordinator;
mod input;
mod post_check;
mod probe;
mod runner;
mod session;
mod types;
mod watch;

pub use cancel::{
    is_confirmation, CancelSettings, CancellationController, Confirm, CtrlC, InterruptSource,
    TerminalConfirm,
};
pub use chain::DownstreamWalker;
pub use client::{job_path, queue_id_from_location, ClientSettings, JenkinsApi, ReqwestJenkins};
pub use console::{
    strip_markup, ConsoleStream, LineNormalizer, CHUNK_WIDTH, MAX_BATCH_LINES, MAX_CHUNKS_PER_LINE,
};
pub use coordinator::{shared_renderer, BarRenderer, RenderHandle, SharedRenderer, WatchScope};
pub use input::{InputError, InputMux, KeystrokeLease};
pub use post_check::{PostCheck, PostCheckSettings, PostDeployCheck};
pub use probe::{
    run_attached, run_with_timeout, Attached, ClusterProbe, KubectlProbe, PodQuery, ProbeError,
    LOG_TAIL_LINES,
};
pub use runner::JobRunner;
pub use session::SessionHandle;
pub use types::{
    Action, ApiError, BuildInfo, BuildRef, BuildSummary, Cause, ConsoleChunk, Cursor, Discovery,
    EventSink, FailureKind, JobInfo, JobProperty, NullSink, ParameterDefinition, ParameterValue,
    PostCheckEvent, ProjectRef, QueueItem, QueueListing, RunOutcome, WatchError, WatchEvent,
};
pub use watch::{BuildWatcher, WatchSettings};
