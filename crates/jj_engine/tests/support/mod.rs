#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use jj_core::BarCommand;
use jj_engine::{
    ApiError, BarRenderer, BuildInfo, BuildRef, BuildSummary, Cause, Action, ConsoleChunk,
    Confirm, Cursor, EventSink, FailureKind, InputError, InterruptSource, JenkinsApi, JobInfo,
    PostCheck, ProjectRef, QueueItem, WatchEvent, WatchSettings,
};

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(jj_logging::initialize_for_tests);
}

/// Settings with short budgets so failure paths finish quickly.
pub fn fast_settings() -> WatchSettings {
    WatchSettings {
        poll_failure_budget: Duration::from_millis(200),
        ..WatchSettings::default()
    }
}

pub fn not_found(what: &str) -> ApiError {
    ApiError::new(FailureKind::NotFound, what)
}

pub fn job(name: &str, last_build: u64, downstream: &[&str]) -> JobInfo {
    JobInfo {
        name: name.to_string(),
        next_build_number: last_build + 1,
        last_build: (last_build > 0).then(|| BuildRef {
            number: last_build,
            url: String::new(),
        }),
        downstream_projects: downstream
            .iter()
            .map(|name| ProjectRef {
                name: name.to_string(),
            })
            .collect(),
        ..JobInfo::default()
    }
}

pub fn running(number: u64) -> BuildInfo {
    BuildInfo {
        number,
        building: true,
        ..BuildInfo::default()
    }
}

pub fn finished(number: u64, result: &str) -> BuildInfo {
    BuildInfo {
        number,
        building: false,
        result: Some(result.to_string()),
        duration: 1_000,
        ..BuildInfo::default()
    }
}

pub fn caused_by(mut build: BuildInfo, parent: &str, parent_build: u64) -> BuildInfo {
    build.actions.push(Action {
        causes: vec![Cause {
            short_description: None,
            upstream_project: Some(parent.to_string()),
            upstream_build: Some(parent_build),
        }],
        parameters: Vec::new(),
    });
    build
}

pub fn waiting(queue_id: u64) -> QueueItem {
    QueueItem {
        id: queue_id,
        why: Some("Waiting for next available executor".to_string()),
        ..QueueItem::default()
    }
}

pub fn assigned(queue_id: u64, number: u64) -> QueueItem {
    QueueItem {
        id: queue_id,
        executable: Some(BuildRef {
            number,
            url: format!("http://fake/job/x/{number}/"),
        }),
        ..QueueItem::default()
    }
}

/// Scripted responses; the last response of each script repeats.
#[derive(Default)]
pub struct FakeState {
    pub jobs: HashMap<String, JobInfo>,
    pub last_success: HashMap<String, BuildInfo>,
    pub queue_items: HashMap<u64, VecDeque<QueueItem>>,
    pub queue: Vec<QueueItem>,
    pub builds: HashMap<(String, u64), VecDeque<Result<BuildInfo, ApiError>>>,
    pub consoles: HashMap<(String, u64), Vec<String>>,
    /// Build state served once a stop request arrived.
    pub after_stop: HashMap<(String, u64), BuildInfo>,
    pub next_queue_id: u64,
    pub triggered: Vec<(String, Vec<(String, String)>)>,
    pub canceled_queue: Vec<u64>,
    pub stopped: Vec<(String, u64)>,
    pub job_info_calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeJenkins {
    pub state: Mutex<FakeState>,
}

impl FakeJenkins {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().next_queue_id = 100;
        fake
    }

    pub fn with<F: FnOnce(&mut FakeState)>(self, f: F) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn script_build(
        &self,
        job: &str,
        number: u64,
        responses: Vec<Result<BuildInfo, ApiError>>,
    ) {
        self.state
            .lock()
            .unwrap()
            .builds
            .insert((job.to_string(), number), responses.into());
    }

    pub fn script_console(&self, job: &str, number: u64, chunks: &[&str]) {
        self.state.lock().unwrap().consoles.insert(
            (job.to_string(), number),
            chunks.iter().map(|c| c.to_string()).collect(),
        );
    }

    pub fn snapshot<T>(&self, f: impl FnOnce(&FakeState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }
}

fn next_scripted<T: Clone>(script: &mut VecDeque<T>) -> Option<T> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

#[async_trait::async_trait]
impl JenkinsApi for FakeJenkins {
    async fn job_info(&self, job: &str) -> Result<JobInfo, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.job_info_calls.push(job.to_string());
        state.jobs.get(job).cloned().ok_or_else(|| not_found(job))
    }

    async fn last_successful_build(&self, job: &str) -> Result<Option<BuildInfo>, ApiError> {
        Ok(self.state.lock().unwrap().last_success.get(job).cloned())
    }

    async fn trigger_build(&self, job: &str, params: &[(String, String)]) -> Result<u64, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.triggered.push((job.to_string(), params.to_vec()));
        state.next_queue_id += 1;
        Ok(state.next_queue_id)
    }

    async fn queue_item(&self, queue_id: u64) -> Result<QueueItem, ApiError> {
        let mut state = self.state.lock().unwrap();
        state
            .queue_items
            .get_mut(&queue_id)
            .and_then(next_scripted)
            .ok_or_else(|| not_found("queue item"))
    }

    async fn queue(&self) -> Result<Vec<QueueItem>, ApiError> {
        Ok(self.state.lock().unwrap().queue.clone())
    }

    async fn build_info(&self, job: &str, number: u64) -> Result<BuildInfo, ApiError> {
        let mut state = self.state.lock().unwrap();
        let key = (job.to_string(), number);
        if state.stopped.contains(&key) {
            if let Some(build) = state.after_stop.get(&key) {
                return Ok(build.clone());
            }
        }
        state
            .builds
            .get_mut(&key)
            .and_then(next_scripted)
            .unwrap_or_else(|| Err(not_found("build")))
    }

    async fn console(
        &self,
        job: &str,
        number: u64,
        cursor: &Cursor,
    ) -> Result<ConsoleChunk, ApiError> {
        let state = self.state.lock().unwrap();
        let chunks = state
            .consoles
            .get(&(job.to_string(), number))
            .cloned()
            .unwrap_or_default();
        let index: usize = cursor.as_str().parse().unwrap_or(0);
        Ok(match chunks.get(index) {
            Some(text) => ConsoleChunk {
                text: text.clone(),
                next_cursor: Cursor::new((index + 1).to_string()),
                more_data: index + 1 < chunks.len(),
            },
            None => ConsoleChunk {
                text: String::new(),
                next_cursor: cursor.clone(),
                more_data: false,
            },
        })
    }

    async fn console_text(&self, job: &str, number: u64) -> Result<String, ApiError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .consoles
            .get(&(job.to_string(), number))
            .map(|chunks| chunks.concat())
            .unwrap_or_default())
    }

    async fn cancel_queue(&self, queue_id: u64) -> Result<(), ApiError> {
        self.state.lock().unwrap().canceled_queue.push(queue_id);
        Ok(())
    }

    async fn stop_build(&self, job: &str, number: u64) -> Result<(), ApiError> {
        self.state
            .lock()
            .unwrap()
            .stopped
            .push((job.to_string(), number));
        Ok(())
    }

    async fn list_jobs(&self) -> Result<Vec<String>, ApiError> {
        Ok(self.state.lock().unwrap().jobs.keys().cloned().collect())
    }

    async fn recent_builds(&self, _job: &str) -> Result<Vec<BuildSummary>, ApiError> {
        Ok(Vec::new())
    }

    fn console_url(&self, job: &str, number: u64) -> String {
        format!("http://fake/job/{job}/{number}/console")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Command(BarCommand),
    Line(String),
    Close,
}

/// Renderer that remembers everything it was asked to draw.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    pub log: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingRenderer {
    /// Everything except ticks, which depend on timing.
    pub fn significant(&self) -> Vec<Recorded> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !matches!(r, Recorded::Command(BarCommand::Tick)))
            .cloned()
            .collect()
    }
}

impl BarRenderer for RecordingRenderer {
    fn apply(&mut self, command: &BarCommand) {
        self.log.lock().unwrap().push(Recorded::Command(command.clone()));
    }

    fn print_line(&mut self, text: &str) {
        self.log.lock().unwrap().push(Recorded::Line(text.to_string()));
    }

    fn close(&mut self) {
        self.log.lock().unwrap().push(Recorded::Close);
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<WatchEvent>>,
}

impl CollectingSink {
    pub fn take(&self) -> Vec<WatchEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: WatchEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct RecordingPostCheck {
    pub jobs: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl PostCheck for RecordingPostCheck {
    async fn run(&self, job: &str) {
        self.jobs.lock().unwrap().push(job.to_string());
    }
}

/// Fires one interrupt after each delay, then never again.
pub struct ScriptedInterrupts {
    pub delays: VecDeque<Duration>,
}

impl ScriptedInterrupts {
    pub fn after(delays: &[u64]) -> Self {
        Self {
            delays: delays.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        }
    }
}

#[async_trait::async_trait]
impl InterruptSource for ScriptedInterrupts {
    async fn next_interrupt(&mut self) -> bool {
        match self.delays.pop_front() {
            Some(delay) => {
                tokio::time::sleep(delay).await;
                true
            }
            None => false,
        }
    }
}

/// Answers prompts from a script and remembers the questions.
#[derive(Clone, Default)]
pub struct ScriptedConfirm {
    pub answers: Arc<Mutex<VecDeque<bool>>>,
    pub questions: Arc<Mutex<Vec<String>>>,
    /// Never answers, like a user who walked away from the prompt.
    pub silent: bool,
}

impl ScriptedConfirm {
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.iter().copied().collect())),
            questions: Arc::default(),
            silent: false,
        }
    }

    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
impl Confirm for ScriptedConfirm {
    async fn confirm(&self, question: &str) -> Result<bool, InputError> {
        self.questions.lock().unwrap().push(question.to_string());
        if self.silent {
            std::future::pending::<()>().await;
        }
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(InputError::Closed)
    }
}
