//! Terminal side of the watch: bar renderers and the event printer.

use std::io::Write;

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use jj_core::{BarCommand, PodReadiness, RESULT_SUCCESS};
use jj_engine::{BarRenderer, Discovery, EventSink, PostCheckEvent, WatchEvent};
use jj_logging::{jj_debug, jj_warn};

const BAR_TEMPLATE: &str = "{msg} [{bar:40.cyan/blue}] {pos:>3}%";
const FINISHED_TEMPLATE: &str = "{msg}";
const BAR_LENGTH: u64 = 100;

fn bar_style(template: &str) -> ProgressStyle {
    match ProgressStyle::with_template(template) {
        Ok(style) => style.progress_chars("=> "),
        Err(err) => {
            jj_warn!("bad progress template {template:?}: {err}");
            ProgressStyle::default_bar()
        }
    }
}

/// Live progress bar for interactive terminals.
///
/// A fresh bar is drawn for every watched job; console lines are printed
/// above it so the bar stays on the last line.
#[derive(Default)]
pub struct IndicatifRenderer {
    bar: Option<ProgressBar>,
}

impl IndicatifRenderer {
    fn start(&mut self, label: &str) {
        if let Some(old) = self.bar.take() {
            old.abandon();
        }
        let bar = ProgressBar::with_draw_target(Some(BAR_LENGTH), ProgressDrawTarget::stdout());
        bar.set_style(bar_style(BAR_TEMPLATE));
        bar.set_message(label.to_string());
        self.bar = Some(bar);
    }
}

impl BarRenderer for IndicatifRenderer {
    fn apply(&mut self, command: &BarCommand) {
        match command {
            BarCommand::Start { label } => self.start(label),
            BarCommand::Tick => {
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                }
            }
            BarCommand::Interrupt(text) => self.print_line(text),
            // indicatif wraps and clears its own lines.
            BarCommand::SetLines(_) => {}
            BarCommand::ClearLine => {
                if let Some(bar) = &self.bar {
                    bar.set_position(BAR_LENGTH);
                }
            }
            BarCommand::SetFormat(text) => {
                if let Some(bar) = &self.bar {
                    bar.set_style(bar_style(FINISHED_TEMPLATE));
                    bar.set_message(text.clone());
                }
            }
            BarCommand::Done => {
                if let Some(bar) = self.bar.take() {
                    bar.finish();
                }
            }
            BarCommand::MarkFailed => println!("{}", style("failed").red()),
        }
    }

    fn print_line(&mut self, text: &str) {
        match &self.bar {
            Some(bar) => bar.println(text),
            None => println!("{text}"),
        }
    }

    fn close(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

/// Line-oriented renderer for pipes and log capture: no redraws, only the
/// console lines and the final summary.
pub struct PlainRenderer<W> {
    out: W,
    summary: Option<String>,
}

impl<W: Write> PlainRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, summary: None }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(err) = writeln!(self.out, "{text}") {
            jj_debug!("plain renderer write failed: {err}");
        }
    }
}

impl<W: Write + Send> BarRenderer for PlainRenderer<W> {
    fn apply(&mut self, command: &BarCommand) {
        match command {
            BarCommand::Start { label } => self.line(label),
            BarCommand::Interrupt(text) => self.line(text),
            BarCommand::SetFormat(text) => self.summary = Some(text.clone()),
            BarCommand::Done => {
                if let Some(summary) = self.summary.take() {
                    self.line(&summary);
                }
            }
            BarCommand::MarkFailed => self.line("failed"),
            BarCommand::Tick | BarCommand::SetLines(_) | BarCommand::ClearLine => {}
        }
    }

    fn print_line(&mut self, text: &str) {
        self.line(text);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Good,
    Warn,
    Bad,
}

/// One user-facing line for a watch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub tone: Tone,
    pub text: String,
}

impl Notice {
    pub(crate) fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }

    pub(crate) fn styled(&self) -> String {
        match self.tone {
            Tone::Plain => self.text.clone(),
            Tone::Good => style(&self.text).green().to_string(),
            Tone::Warn => style(&self.text).yellow().to_string(),
            Tone::Bad => style(&self.text).red().to_string(),
        }
    }
}

/// Text for an event, or `None` for events that only go to the log.
pub fn describe(event: &WatchEvent) -> Option<Notice> {
    use Tone::*;
    let notice = match event {
        WatchEvent::Triggered { .. } | WatchEvent::ExecutorAssigned { .. } => return None,
        WatchEvent::WaitingForExecutor { .. } => {
            Notice::new(Plain, "waiting for next available executor..")
        }
        WatchEvent::BuildFinished { result, .. } if result == RESULT_SUCCESS => {
            Notice::new(Good, "done")
        }
        // The bar already marked the failure.
        WatchEvent::BuildFinished { .. } => return None,
        WatchEvent::DownstreamPending { parent, child } => {
            Notice::new(Plain, format!("waiting for {child} to be started by {parent}.."))
        }
        WatchEvent::DownstreamFound { child, discovery } => match discovery {
            Discovery::History { build_number } => {
                Notice::new(Plain, format!("{child} #{build_number} is running"))
            }
            Discovery::Queue { queue_id } => {
                Notice::new(Plain, format!("{child} is queued (item {queue_id})"))
            }
        },
        WatchEvent::PostCheckSkipped { job } => {
            Notice::new(Plain, format!("cluster check skipped for {job}"))
        }
        WatchEvent::PostCheck(event) => describe_post_check(event),
        WatchEvent::CancelingQueue { .. } => Notice::new(Plain, "canceling queue..."),
        WatchEvent::CancelingBuild { .. } => Notice::new(Plain, "canceling job..."),
        WatchEvent::ChainDone { job } => Notice::new(Good, format!("{job}: all jobs finished")),
    };
    Some(notice)
}

fn describe_post_check(event: &PostCheckEvent) -> Notice {
    use Tone::*;
    match event {
        PostCheckEvent::Started { job, deployment } => Notice::new(
            Plain,
            format!("checking deployment {deployment} (inferred from job {job})"),
        ),
        PostCheckEvent::NoDeploymentName { job } => {
            Notice::new(Warn, format!("no deployment name could be inferred from {job}"))
        }
        PostCheckEvent::Rollout { deployment, outcome } => match outcome {
            Ok(status) => Notice::new(Plain, format!("rollout {deployment}: {}", status.trim())),
            Err(err) => Notice::new(
                Warn,
                format!("rollout status of {deployment} unavailable: {err}"),
            ),
        },
        PostCheckEvent::PodsFound { pods } => Notice::new(
            Good,
            format!("found {} matching pods: {}", pods.len(), pods.join(", ")),
        ),
        PostCheckEvent::NoPods { deployment } => {
            Notice::new(Warn, format!("no pod name starts with {deployment}"))
        }
        PostCheckEvent::SelectorMatched { selector, pods } => Notice::new(
            Good,
            format!("selector {selector} matches {} pods: {}", pods.len(), pods.join(", ")),
        ),
        PostCheckEvent::NoSelectorMatched { deployment } => {
            Notice::new(Warn, format!("no label selector matches {deployment}"))
        }
        PostCheckEvent::RoundStarted => Notice::new(
            Plain,
            format!("{} - checking pod status...", chrono::Local::now().format("%H:%M:%S")),
        ),
        PostCheckEvent::PodStatus { pod, readiness } => describe_pod(pod, readiness),
        PostCheckEvent::LookupFailed { pod, error } => {
            Notice::new(Bad, format!("{pod}: status lookup failed: {error}"))
        }
        PostCheckEvent::RoundDone => Notice::new(Plain, "-".repeat(50)),
        PostCheckEvent::RolledOver { pod } => {
            Notice::new(Good, format!("pod check finished: {pod} has been replaced"))
        }
        PostCheckEvent::TimedOut { secs } => {
            Notice::new(Warn, format!("cluster check timed out after {secs}s"))
        }
    }
}

pub(crate) fn describe_pod(pod: &str, readiness: &PodReadiness) -> Notice {
    use Tone::*;
    match readiness {
        PodReadiness::Ready { ready } => Notice::new(Good, format!("{pod}: Running ({ready})")),
        PodReadiness::NotReady { status, ready } => {
            Notice::new(Warn, format!("{pod}: {status} ({ready}) - not fully ready"))
        }
        PodReadiness::Unhealthy { status, ready } => {
            Notice::new(Bad, format!("{pod}: {status} ({ready})"))
        }
        PodReadiness::Missing => Notice::new(Warn, format!("{pod}: pod does not exist")),
        PodReadiness::Unparsed(line) => {
            Notice::new(Warn, format!("{pod}: unexpected status line {line:?}"))
        }
    }
}

/// Prints watch events on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&self, event: WatchEvent) {
        jj_debug!("event: {event:?}");
        if let Some(notice) = describe(&event) {
            println!("{}", notice.styled());
        }
    }
}
