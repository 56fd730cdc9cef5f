//! Render reducer: the coordinator feeds every [`RenderUpdate`] through
//! [`update`] and applies the returned [`BarCommand`]s to the bar widget.

use crate::progress::{INITIAL_PERCENT, MAX_RUNNING_PERCENT};

/// Minimum line allotment given to the bar when a build fails, so the
/// failure banner is not clipped by wrapped console output.
pub const FAILED_MIN_LINES: u16 = 10;
const FAILED_GROW_BELOW: u16 = 5;
const RUNNING_LABEL: &str = "running...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishTag {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderUpdate {
    /// Advance the bar by one percent.
    Tick,
    /// Print text above the bar. An empty message is treated as a tick.
    Message(String),
    /// Grow the bar's line allotment (a newline was typed).
    LineDelta(u16),
    /// Terminal update for the watched job.
    Finish { tag: FinishTag, summary: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarCommand {
    /// Draw the bar for the first time with the given label.
    Start { label: String },
    Tick,
    Interrupt(String),
    SetLines(u16),
    /// Blank the current terminal line before the final render.
    ClearLine,
    SetFormat(String),
    Done,
    /// Print the visible failure marker after the bar.
    MarkFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Running,
    Finished,
}

/// Bookkeeping for one watched job's bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderState {
    job_url: String,
    lines: u16,
    percent: u8,
    phase: Phase,
}

impl RenderState {
    pub fn new(job_url: impl Into<String>) -> Self {
        Self {
            job_url: job_url.into(),
            lines: 1,
            percent: 0,
            phase: Phase::Fresh,
        }
    }

    pub fn lines(&self) -> u16 {
        self.lines
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Commands for the bar's first render, including the initial tick.
    pub fn start(&mut self) -> Vec<BarCommand> {
        if self.phase != Phase::Fresh {
            return Vec::new();
        }
        self.phase = Phase::Running;
        self.percent = INITIAL_PERCENT;
        vec![
            BarCommand::Start {
                label: RUNNING_LABEL.to_string(),
            },
            BarCommand::Tick,
        ]
    }

    fn tick(&mut self) -> Vec<BarCommand> {
        if self.percent >= MAX_RUNNING_PERCENT {
            return Vec::new();
        }
        self.percent += 1;
        vec![BarCommand::Tick]
    }
}

/// Pure update function: applies an update to the bar state and returns the
/// widget commands it implies. Nothing is emitted after a finish.
pub fn update(mut state: RenderState, msg: RenderUpdate) -> (RenderState, Vec<BarCommand>) {
    let mut commands = match state.phase {
        Phase::Finished => return (state, Vec::new()),
        Phase::Fresh => state.start(),
        Phase::Running => Vec::new(),
    };

    match msg {
        RenderUpdate::Tick => commands.extend(state.tick()),
        RenderUpdate::Message(text) if text.is_empty() => commands.extend(state.tick()),
        RenderUpdate::Message(text) => commands.push(BarCommand::Interrupt(text)),
        RenderUpdate::LineDelta(delta) => {
            if delta > 0 {
                state.lines = state.lines.saturating_add(delta);
                commands.push(BarCommand::SetLines(state.lines));
            }
        }
        RenderUpdate::Finish { tag, summary } => {
            state.phase = Phase::Finished;
            match tag {
                FinishTag::Failed => {
                    if state.lines < FAILED_GROW_BELOW {
                        state.lines = FAILED_MIN_LINES;
                        commands.push(BarCommand::SetLines(state.lines));
                    }
                }
                FinishTag::Success => {
                    state.percent = 100;
                    commands.push(BarCommand::ClearLine);
                }
            }
            commands.push(BarCommand::SetFormat(format!("{}: {}", state.job_url, summary)));
            commands.push(BarCommand::Done);
            if tag == FinishTag::Failed {
                commands.push(BarCommand::MarkFailed);
            }
        }
    }

    (state, commands)
}
