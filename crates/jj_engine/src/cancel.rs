use std::sync::Arc;
use std::time::Duration;

use jj_core::{
    outcome_from_stop, queue_fate, recent_build_numbers, CancelOutcome, CancelPlan, HistoryEntry,
    QueueFate,
};
use jj_logging::{jj_info, jj_warn};

use crate::coordinator::SharedRenderer;
use crate::{EventSink, InputError, InputMux, JenkinsApi, SessionHandle, WatchEvent};

/// Delivers user interrupts.
#[async_trait::async_trait]
pub trait InterruptSource: Send {
    /// Resolves on the next interrupt; `false` once no more can arrive.
    async fn next_interrupt(&mut self) -> bool;
}

/// Ctrl-C from the terminal.
///
/// The signal stream is registered on first use and kept, so an interrupt
/// arriving between two waits is still delivered.
#[derive(Debug, Default)]
pub struct CtrlC {
    #[cfg(unix)]
    stream: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
#[async_trait::async_trait]
impl InterruptSource for CtrlC {
    async fn next_interrupt(&mut self) -> bool {
        use tokio::signal::unix::{signal, SignalKind};

        if self.stream.is_none() {
            match signal(SignalKind::interrupt()) {
                Ok(stream) => self.stream = Some(stream),
                Err(err) => {
                    jj_warn!("cannot listen for ctrl-c: {err}");
                    return false;
                }
            }
        }
        match self.stream.as_mut() {
            Some(stream) => stream.recv().await.is_some(),
            None => false,
        }
    }
}

#[cfg(not(unix))]
#[async_trait::async_trait]
impl InterruptSource for CtrlC {
    async fn next_interrupt(&mut self) -> bool {
        match tokio::signal::ctrl_c().await {
            Ok(()) => true,
            Err(err) => {
                jj_warn!("cannot listen for ctrl-c: {err}");
                false
            }
        }
    }
}

/// Asks the user a yes/no question.
#[async_trait::async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, question: &str) -> Result<bool, InputError>;
}

/// Only an explicit yes cancels.
pub fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "Y")
}

/// Asks on the terminal while holding the bar so redraws cannot clobber
/// the question.
pub struct TerminalConfirm {
    input: InputMux,
    renderer: SharedRenderer,
}

impl TerminalConfirm {
    pub fn new(input: InputMux, renderer: SharedRenderer) -> Self {
        Self { input, renderer }
    }
}

#[async_trait::async_trait]
impl Confirm for TerminalConfirm {
    async fn confirm(&self, question: &str) -> Result<bool, InputError> {
        let mut bar = self.renderer.lock().await;
        bar.print_line(question);
        let answer = self.input.read_line().await;
        drop(bar);
        Ok(is_confirmation(&answer?))
    }
}

#[derive(Debug, Clone)]
pub struct CancelSettings {
    /// Recent builds searched for a cancelled queue entry.
    pub history_depth: u64,
    pub stop_poll: Duration,
    pub stop_attempts: u32,
}

impl Default for CancelSettings {
    fn default() -> Self {
        Self {
            history_depth: 3,
            stop_poll: Duration::from_millis(200),
            stop_attempts: 50,
        }
    }
}

/// Turns interrupts into confirmed cancellations of the watched job.
pub struct CancellationController<S, C> {
    api: Arc<dyn JenkinsApi>,
    session: SessionHandle,
    sink: Arc<dyn EventSink>,
    interrupts: S,
    confirm: C,
    settings: CancelSettings,
}

impl<S: InterruptSource, C: Confirm> CancellationController<S, C> {
    pub fn new(
        api: Arc<dyn JenkinsApi>,
        session: SessionHandle,
        sink: Arc<dyn EventSink>,
        interrupts: S,
        confirm: C,
    ) -> Self {
        Self {
            api,
            session,
            sink,
            interrupts,
            confirm,
            settings: CancelSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: CancelSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Resolves once the user interrupted and the interrupt ended the run.
    /// A declined prompt keeps waiting; another interrupt while the prompt
    /// is open ends the run without cancelling anything.
    pub async fn next_outcome(&mut self) -> CancelOutcome {
        loop {
            if !self.interrupts.next_interrupt().await {
                std::future::pending::<()>().await;
            }
            let Some(plan) = CancelPlan::for_session(&self.session.snapshot()) else {
                return CancelOutcome::Interrupted;
            };
            let question = format!(
                "There is active build: {}. Do you want to cancel it [Y/n]:",
                plan.job
            );
            let interrupts = &mut self.interrupts;
            let answer = tokio::select! {
                answer = self.confirm.confirm(&question) => Some(answer),
                () = async move {
                    if !interrupts.next_interrupt().await {
                        std::future::pending::<()>().await;
                    }
                } => None,
            };
            match answer {
                Some(Ok(true)) => return self.execute(plan).await,
                Some(Ok(false)) => jj_info!("cancel of {} declined", plan.job),
                Some(Err(err)) => {
                    jj_warn!("cancel prompt failed: {err}");
                    return CancelOutcome::Interrupted;
                }
                None => {
                    jj_info!("interrupted again while asking to cancel {}", plan.job);
                    return CancelOutcome::Interrupted;
                }
            }
        }
    }

    async fn execute(&self, plan: CancelPlan) -> CancelOutcome {
        // Re-read: the build may have left the queue while the user answered.
        let plan = CancelPlan::for_session(&self.session.snapshot()).unwrap_or(plan);

        if let Some(queue_id) = plan.cancel_queue {
            self.sink.emit(WatchEvent::CancelingQueue { queue_id });
            if let Err(err) = self.api.cancel_queue(queue_id).await {
                jj_warn!("cancel of queue item {queue_id} failed: {err}");
            }
        }

        if let Some(number) = plan.stop_build {
            return self.stop(&plan.job, number).await;
        }

        match plan.verify_queue {
            Some(queue_id) => self.verify_queue(&plan.job, queue_id).await,
            None => CancelOutcome::Canceled,
        }
    }

    async fn stop(&self, job: &str, number: u64) -> CancelOutcome {
        self.sink.emit(WatchEvent::CancelingBuild {
            job: job.to_string(),
            build_number: number,
        });
        if let Err(err) = self.api.stop_build(job, number).await {
            return CancelOutcome::CancelFailed {
                reason: err.to_string(),
            };
        }
        match self.final_status(job, number).await {
            Some(status) => outcome_from_stop(&status),
            None => CancelOutcome::CancelFailed {
                reason: format!("{job} #{number} still running after stop"),
            },
        }
    }

    async fn final_status(&self, job: &str, number: u64) -> Option<String> {
        for _ in 0..self.settings.stop_attempts {
            match self.api.build_info(job, number).await {
                Ok(build) if !build.building => {
                    return Some(build.result.unwrap_or_else(|| "UNKNOWN".to_string()))
                }
                Ok(_) => {}
                Err(err) => jj_warn!("reading {job} #{number} after stop failed: {err}"),
            }
            tokio::time::sleep(self.settings.stop_poll).await;
        }
        None
    }

    async fn verify_queue(&self, job: &str, queue_id: u64) -> CancelOutcome {
        let last = match self.api.job_info(job).await {
            Ok(info) => info.last_build_number(),
            Err(err) => {
                return CancelOutcome::CancelFailed {
                    reason: err.to_string(),
                }
            }
        };
        let mut history = Vec::new();
        let numbers = recent_build_numbers(last, self.settings.history_depth);
        for number in numbers.into_iter().rev() {
            match self.api.build_info(job, number).await {
                Ok(build) => history.push(HistoryEntry {
                    number,
                    queue_id: build.queue_id,
                    building: build.building,
                    result: build.result,
                }),
                Err(err) => jj_warn!("reading {job} #{number} failed: {err}"),
            }
        }
        match queue_fate(queue_id, &history) {
            QueueFate::NeverRan => CancelOutcome::Canceled,
            QueueFate::Settled(outcome) => outcome,
            QueueFate::Running { number } => {
                jj_info!("queue item {queue_id} already started {job} #{number}");
                self.stop(job, number).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::is_confirmation;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_confirmation("y"));
        assert!(is_confirmation(" Y \n"));
        assert!(!is_confirmation(""));
        assert!(!is_confirmation("yes"));
        assert!(!is_confirmation("n"));
    }
}
