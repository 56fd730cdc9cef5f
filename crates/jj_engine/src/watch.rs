use std::sync::Arc;
use std::time::Duration;

use jj_core::{FinishTag, PostCheckFilter, RESULT_SUCCESS};
use jj_logging::{jj_debug, jj_info, jj_warn};
use tokio::time::Instant;

use crate::console::ConsoleStream;
use crate::coordinator::{RenderHandle, SharedRenderer, WatchScope};
use crate::post_check::PostCheck;
use crate::{EventSink, InputMux, JenkinsApi, SessionHandle, WatchError, WatchEvent};

/// Timing knobs for one watch. Defaults mirror what the build server copes
/// with comfortably.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub executor_poll: Duration,
    pub status_poll: Duration,
    /// Pause between console lines while the build runs.
    pub live_pacing: Duration,
    /// Pause between console lines while draining after success.
    pub drain_pacing: Duration,
    pub tick_interval: Duration,
    /// Longest streak of failed status polls tolerated before giving up.
    pub poll_failure_budget: Duration,
    pub downstream_retry: Duration,
    pub downstream_history_depth: u64,
    /// Send console lines in groups of three.
    pub verbose: bool,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            executor_poll: Duration::from_millis(100),
            status_poll: Duration::from_millis(10),
            live_pacing: Duration::from_millis(100),
            drain_pacing: Duration::from_millis(1),
            tick_interval: Duration::from_millis(100),
            poll_failure_budget: Duration::from_secs(10),
            downstream_retry: Duration::from_millis(250),
            downstream_history_depth: 6,
            verbose: false,
        }
    }
}

const VERBOSE_BATCH: usize = 3;

/// Follows single builds from queue to terminal status.
#[derive(Clone)]
pub struct BuildWatcher {
    pub(crate) api: Arc<dyn JenkinsApi>,
    pub(crate) session: SessionHandle,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) settings: WatchSettings,
    renderer: SharedRenderer,
    input: Option<InputMux>,
    filter: Arc<dyn PostCheckFilter>,
    post_check: Option<Arc<dyn PostCheck>>,
}

impl BuildWatcher {
    pub fn new(
        api: Arc<dyn JenkinsApi>,
        session: SessionHandle,
        renderer: SharedRenderer,
        sink: Arc<dyn EventSink>,
        filter: Arc<dyn PostCheckFilter>,
    ) -> Self {
        Self {
            api,
            session,
            sink,
            settings: WatchSettings::default(),
            renderer,
            input: None,
            filter,
            post_check: None,
        }
    }

    pub fn with_settings(mut self, settings: WatchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Newlines typed during a watch grow the bar.
    pub fn with_input(mut self, input: InputMux) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_post_check(mut self, post_check: Arc<dyn PostCheck>) -> Self {
        self.post_check = Some(post_check);
        self
    }

    /// Polls a queue entry until an executor picks it up.
    pub async fn wait_for_executor(&self, job: &str, queue_id: u64) -> Result<u64, WatchError> {
        let mut announced = false;
        loop {
            let item = self.api.queue_item(queue_id).await?;
            if let Some(number) = item.assigned_build() {
                self.session.set_build(number);
                self.sink.emit(WatchEvent::ExecutorAssigned {
                    job: job.to_string(),
                    build_number: number,
                });
                return Ok(number);
            }
            if !announced {
                announced = true;
                jj_debug!("queue item {queue_id} waiting: {:?}", item.why);
                self.sink.emit(WatchEvent::WaitingForExecutor {
                    job: job.to_string(),
                    queue_id,
                });
            }
            tokio::time::sleep(self.settings.executor_poll).await;
        }
    }

    /// Streams a running build until it reaches a terminal status.
    ///
    /// `Ok` only for SUCCESS; every other terminal status is a
    /// [`WatchError::JobFailed`].
    pub async fn watch_build(&self, job: &str, number: u64) -> Result<(), WatchError> {
        let reference = match self.api.last_successful_build(job).await {
            Ok(build) => build.map(|b| Duration::from_millis(b.duration)),
            Err(err) => {
                jj_warn!("no reference duration for {job}: {err}");
                None
            }
        };

        let mut scope = WatchScope::new(self.renderer.clone());
        let render = scope.spawn_coordinator(self.api.console_url(job, number));
        scope.spawn_ticker(render.clone(), reference, self.settings.tick_interval);
        if let Some(input) = &self.input {
            scope.spawn_keystrokes(render.clone(), input.keystrokes());
        }

        let mut console = ConsoleStream::new(job, number);
        let mut needs_post_check = !self.filter.skip_for_job(job);
        let mut failing_since: Option<Instant> = None;

        loop {
            match self.api.build_info(job, number).await {
                Err(err) => {
                    let since = *failing_since.get_or_insert_with(Instant::now);
                    jj_debug!("status poll for {job} #{number} failed: {err}");
                    if since.elapsed() > self.settings.poll_failure_budget {
                        jj_warn!("giving up on {job} #{number} after {:?}", since.elapsed());
                        render.finish(FinishTag::Failed, "failed");
                        scope.complete().await;
                        return Err(WatchError::PollBudgetExceeded {
                            job: job.to_string(),
                            build_number: number,
                        });
                    }
                }
                Ok(info) => {
                    failing_since = None;
                    if !info.building {
                        let result = info.result.unwrap_or_else(|| "UNKNOWN".to_string());
                        return self
                            .conclude(
                                scope,
                                &render,
                                &mut console,
                                needs_post_check,
                                job,
                                number,
                                result,
                            )
                            .await;
                    }
                }
            }

            let advanced = self
                .forward_console(
                    &mut console,
                    &render,
                    self.settings.live_pacing,
                    &mut needs_post_check,
                )
                .await;
            if !advanced {
                tokio::time::sleep(self.settings.status_poll).await;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn conclude(
        &self,
        scope: WatchScope,
        render: &RenderHandle,
        console: &mut ConsoleStream,
        mut needs_post_check: bool,
        job: &str,
        number: u64,
        result: String,
    ) -> Result<(), WatchError> {
        let succeeded = result == RESULT_SUCCESS;
        if succeeded {
            while self
                .forward_console(console, render, self.settings.drain_pacing, &mut needs_post_check)
                .await
            {}
            render.finish(FinishTag::Success, result.as_str());
        } else {
            render.finish(FinishTag::Failed, result.as_str());
        }
        scope.complete().await;

        jj_info!("{job} #{number} finished: {result}");
        self.sink.emit(WatchEvent::BuildFinished {
            job: job.to_string(),
            build_number: number,
            result: result.clone(),
        });
        if !succeeded {
            return Err(WatchError::JobFailed {
                job: job.to_string(),
                result,
            });
        }

        // Nothing left to cancel once the build succeeded.
        self.session.clear();
        match &self.post_check {
            Some(check) if needs_post_check => check.run(job).await,
            Some(_) => self.sink.emit(WatchEvent::PostCheckSkipped {
                job: job.to_string(),
            }),
            None => {}
        }
        Ok(())
    }

    /// Sends newly available console lines to the bar. Returns whether the
    /// cursor advanced.
    async fn forward_console(
        &self,
        console: &mut ConsoleStream,
        render: &RenderHandle,
        pacing: Duration,
        needs_post_check: &mut bool,
    ) -> bool {
        let lines = match console.next_batch(self.api.as_ref()).await {
            Ok(Some(lines)) => lines,
            Ok(None) => return false,
            Err(err) => {
                jj_debug!("console fetch failed at {}: {err}", console.cursor());
                return false;
            }
        };
        if *needs_post_check && lines.iter().any(|line| self.filter.skip_for_line(line)) {
            *needs_post_check = false;
        }

        let batch = if self.settings.verbose { VERBOSE_BATCH } else { 1 };
        for group in lines.chunks(batch) {
            render.message(group.join("\n"));
            tokio::time::sleep(pacing).await;
        }
        true
    }
}
