use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use jj_core::{update, BarCommand, FinishTag, ProgressEstimator, RenderState, RenderUpdate};
use jj_logging::jj_trace;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::input::KeystrokeLease;

/// Terminal widget driven by the render coordinator.
pub trait BarRenderer: Send {
    fn apply(&mut self, command: &BarCommand);

    /// Prints a line outside the bar, e.g. a question for the user.
    fn print_line(&mut self, text: &str);

    /// Leaves the widget in a sane state when a watch ends without a finish.
    fn close(&mut self) {}
}

/// The bar is locked by the coordinator for each batch of commands and by
/// the cancel prompt for the whole question, so the two never interleave.
pub type SharedRenderer = Arc<tokio::sync::Mutex<Box<dyn BarRenderer>>>;

pub fn shared_renderer(renderer: impl BarRenderer + 'static) -> SharedRenderer {
    Arc::new(tokio::sync::Mutex::new(Box::new(renderer)))
}

/// Sending half of the coordinator channel.
///
/// After [`RenderHandle::finish`] every further send is dropped, so a finish
/// is always the last update the coordinator sees.
#[derive(Debug, Clone)]
pub struct RenderHandle {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<RenderUpdate>>>>,
}

impl RenderHandle {
    fn new(tx: mpsc::UnboundedSender<RenderUpdate>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    pub fn send(&self, msg: RenderUpdate) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().is_some_and(|tx| tx.send(msg).is_ok())
    }

    pub fn message(&self, text: impl Into<String>) -> bool {
        self.send(RenderUpdate::Message(text.into()))
    }

    pub fn finish(&self, tag: FinishTag, summary: impl Into<String>) {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.take() {
            let _ = tx.send(RenderUpdate::Finish {
                tag,
                summary: summary.into(),
            });
        }
    }
}

/// Task group owning every helper task of one watched build.
///
/// Dropping the scope cancels and aborts the tasks; the bar is closed if
/// the watch never reached its finish.
pub struct WatchScope {
    close: CancellationToken,
    tasks: JoinSet<()>,
    renderer: SharedRenderer,
    finished: bool,
}

impl WatchScope {
    pub fn new(renderer: SharedRenderer) -> Self {
        Self {
            close: CancellationToken::new(),
            tasks: JoinSet::new(),
            renderer,
            finished: false,
        }
    }

    /// Starts the coordinator that owns all bar mutation for this watch.
    pub fn spawn_coordinator(&mut self, job_url: impl Into<String>) -> RenderHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = RenderState::new(job_url);
        self.tasks.spawn(run_coordinator(
            self.renderer.clone(),
            state,
            rx,
            self.close.clone(),
        ));
        RenderHandle::new(tx)
    }

    /// Advances the bar from elapsed time against a reference duration.
    pub fn spawn_ticker(
        &mut self,
        render: RenderHandle,
        reference: Option<Duration>,
        every: Duration,
    ) {
        let close = self.close.clone();
        self.tasks.spawn(async move {
            let started = Instant::now();
            let mut estimator = ProgressEstimator::new(reference);
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = close.cancelled() => break,
                    _ = interval.tick() => {
                        if let Some(delta) = estimator.observe(started.elapsed()) {
                            for _ in 0..delta.ticks {
                                if !render.send(RenderUpdate::Tick) {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });
    }

    /// Each newline typed while the bar runs grows its line allotment.
    pub fn spawn_keystrokes(&mut self, render: RenderHandle, mut keys: KeystrokeLease) {
        let close = self.close.clone();
        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = close.cancelled() => break,
                    key = keys.recv() => match key {
                        Some(b'\n') => {
                            render.send(RenderUpdate::LineDelta(1));
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
            }
        });
    }

    /// Stops the helper tasks once the coordinator has applied the finish.
    ///
    /// Call after [`RenderHandle::finish`]: the coordinator drains queued
    /// updates before it looks at the token.
    pub async fn complete(mut self) {
        self.finished = true;
        self.close.cancel();
        while self.tasks.join_next().await.is_some() {}
    }
}

impl Drop for WatchScope {
    fn drop(&mut self) {
        self.close.cancel();
        self.tasks.abort_all();
        if !self.finished {
            if let Ok(mut renderer) = self.renderer.try_lock() {
                renderer.close();
            }
        }
    }
}

async fn run_coordinator(
    renderer: SharedRenderer,
    mut state: RenderState,
    mut rx: mpsc::UnboundedReceiver<RenderUpdate>,
    close: CancellationToken,
) {
    let commands = state.start();
    apply(&renderer, &commands).await;
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                let (next, commands) = update(state, msg);
                state = next;
                apply(&renderer, &commands).await;
                if state.is_finished() {
                    return;
                }
            }
            _ = close.cancelled() => break,
        }
    }
    jj_trace!("coordinator closed before finish");
    renderer.lock().await.close();
}

async fn apply(renderer: &SharedRenderer, commands: &[BarCommand]) {
    if commands.is_empty() {
        return;
    }
    let mut guard = renderer.lock().await;
    for command in commands {
        guard.apply(command);
    }
}
