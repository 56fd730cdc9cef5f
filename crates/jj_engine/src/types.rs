use std::fmt;

use jj_core::{CancelOutcome, PodReadiness};
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobInfo {
    pub name: String,
    pub next_build_number: u64,
    pub in_queue: bool,
    pub last_build: Option<BuildRef>,
    pub last_completed_build: Option<BuildRef>,
    pub downstream_projects: Vec<ProjectRef>,
    pub property: Vec<JobProperty>,
}

impl JobInfo {
    pub fn parameter_definitions(&self) -> impl Iterator<Item = &ParameterDefinition> {
        self.property
            .iter()
            .flat_map(|property| property.parameter_definitions.iter())
    }

    pub fn last_build_number(&self) -> u64 {
        self.last_build.as_ref().map_or(0, |b| b.number)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BuildRef {
    pub number: u64,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProjectRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobProperty {
    pub parameter_definitions: Vec<ParameterDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub default_parameter_value: Option<ParameterValue>,
    pub choices: Vec<String>,
}

impl ParameterDefinition {
    pub fn default_value(&self) -> String {
        self.default_parameter_value
            .as_ref()
            .map(ParameterValue::value_string)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParameterValue {
    pub name: Option<String>,
    pub value: serde_json::Value,
}

impl ParameterValue {
    /// The value as it would be submitted in a form.
    pub fn value_string(&self) -> String {
        match &self.value {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueItem {
    pub id: u64,
    pub blocked: bool,
    pub cancelled: bool,
    pub why: Option<String>,
    pub executable: Option<BuildRef>,
    pub task: Option<ProjectRef>,
    pub actions: Vec<Action>,
}

impl QueueItem {
    /// Build number once an executor picked the entry up.
    pub fn assigned_build(&self) -> Option<u64> {
        match &self.executable {
            Some(exe) if !self.blocked && !exe.url.is_empty() => Some(exe.number),
            _ => None,
        }
    }

    pub fn task_name(&self) -> Option<&str> {
        self.task.as_ref().map(|t| t.name.as_str())
    }

    pub fn causes(&self) -> impl Iterator<Item = &Cause> {
        self.actions.iter().flat_map(|a| a.causes.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueListing {
    pub items: Vec<QueueItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Action {
    pub causes: Vec<Cause>,
    pub parameters: Vec<ParameterValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cause {
    pub short_description: Option<String>,
    pub upstream_project: Option<String>,
    pub upstream_build: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildInfo {
    pub number: u64,
    pub id: String,
    pub building: bool,
    pub result: Option<String>,
    /// Milliseconds.
    pub duration: u64,
    pub queue_id: u64,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub url: String,
    pub actions: Vec<Action>,
}

impl BuildInfo {
    pub fn causes(&self) -> impl Iterator<Item = &Cause> {
        self.actions.iter().flat_map(|a| a.causes.iter())
    }

    pub fn parameters(&self) -> impl Iterator<Item = &ParameterValue> {
        self.actions.iter().flat_map(|a| a.parameters.iter())
    }
}

/// One row of a job's build listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BuildSummary {
    pub number: u64,
    pub result: Option<String>,
    pub timestamp: i64,
    pub duration: u64,
    pub building: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct BuildListing {
    pub builds: Vec<BuildSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct JobListing {
    pub jobs: Vec<ProjectRef>,
}

/// Opaque read offset into a build's console stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn start() -> Self {
        Cursor("0".to_string())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Cursor(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw console text newly available since the request cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleChunk {
    pub text: String,
    pub next_cursor: Cursor,
    pub more_data: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: FailureKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == FailureKind::NotFound
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    NotFound,
    HttpStatus(u16),
    Timeout,
    Network,
    Decode,
    MissingQueueLocation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::NotFound => write!(f, "not found"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "unexpected response body"),
            FailureKind::MissingQueueLocation => write!(f, "no queue location in trigger response"),
        }
    }
}

/// Where a downstream build was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    History { build_number: u64 },
    Queue { queue_id: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Triggered { job: String, queue_id: u64 },
    WaitingForExecutor { job: String, queue_id: u64 },
    ExecutorAssigned { job: String, build_number: u64 },
    BuildFinished { job: String, build_number: u64, result: String },
    DownstreamPending { parent: String, child: String },
    DownstreamFound { child: String, discovery: Discovery },
    PostCheckSkipped { job: String },
    PostCheck(PostCheckEvent),
    CancelingQueue { queue_id: u64 },
    CancelingBuild { job: String, build_number: u64 },
    ChainDone { job: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostCheckEvent {
    Started { job: String, deployment: String },
    NoDeploymentName { job: String },
    Rollout { deployment: String, outcome: Result<String, String> },
    PodsFound { pods: Vec<String> },
    NoPods { deployment: String },
    SelectorMatched { selector: String, pods: Vec<String> },
    NoSelectorMatched { deployment: String },
    RoundStarted,
    PodStatus { pod: String, readiness: PodReadiness },
    LookupFailed { pod: String, error: String },
    RoundDone,
    /// Original pods are gone: the rollout replaced them.
    RolledOver { pod: String },
    TimedOut { secs: u64 },
}

/// Receives user-facing watch events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WatchEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: WatchEvent) {}
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("job '{0}' does not exist")]
    JobNotFound(String),
    #[error("build server request failed: {0}")]
    Api(#[from] ApiError),
    #[error("job {job} finished with status {result}")]
    JobFailed { job: String, result: String },
    #[error("lost contact with build {job} #{build_number}")]
    PollBudgetExceeded { job: String, build_number: u64 },
}

/// How a watched chain ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    Failed(WatchError),
    Cancelled(CancelOutcome),
}
