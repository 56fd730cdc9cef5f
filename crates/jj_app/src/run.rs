use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use console::style;
use jj_core::SubstringFilter;
use jj_engine::{
    job_path, shared_renderer, BuildWatcher, CancellationController, ClientSettings, CtrlC,
    EventSink, InputMux, JenkinsApi, JobRunner, KubectlProbe, PostCheckSettings, PostDeployCheck,
    ReqwestJenkins, RunOutcome, SessionHandle, SharedRenderer, TerminalConfirm, WatchSettings,
};
use jj_logging::jj_info;

use crate::cli::RunArgs;
use crate::select::resolve_job;
use crate::terminal::{IndicatifRenderer, PlainRenderer, StdoutSink};

/// Pause between the two banner lines.
const BANNER_PACING: Duration = Duration::from_millis(200);

/// `jj run`: trigger the job, follow it and its downstream jobs, and race
/// the whole chain against Ctrl-C.
pub async fn run(settings: ClientSettings, args: RunArgs) -> Result<RunOutcome> {
    let server = settings.base_url.clone();
    let api: Arc<dyn JenkinsApi> = Arc::new(ReqwestJenkins::new(settings)?);
    let input = InputMux::stdin();

    let job = resolve_job(api.as_ref(), &input, &args.pattern).await?;
    print_banner(&server, &job).await;

    let renderer = terminal_renderer();
    let session = SessionHandle::new();
    let sink: Arc<dyn EventSink> = Arc::new(StdoutSink);
    let filter = SubstringFilter::default().with_extra(args.skip_patterns.iter().cloned());
    let watch_settings = WatchSettings {
        poll_failure_budget: args.poll_failure_budget(),
        verbose: args.verbose,
        ..WatchSettings::default()
    };

    let mut watcher = BuildWatcher::new(
        api.clone(),
        session.clone(),
        renderer.clone(),
        sink.clone(),
        Arc::new(filter),
    )
    .with_settings(watch_settings)
    .with_input(input.clone());
    if !args.no_post_check {
        let check = PostDeployCheck::new(
            Arc::new(KubectlProbe::default()),
            sink.clone(),
            PostCheckSettings {
                namespace: args.namespace.clone(),
                ..PostCheckSettings::default()
            },
        );
        watcher = watcher.with_post_check(Arc::new(check));
    }
    let runner = JobRunner::new(watcher);
    let mut controller = CancellationController::new(
        api,
        session,
        sink,
        CtrlC::default(),
        TerminalConfirm::new(input, renderer),
    );

    jj_info!("running {job} with {} parameter overrides", args.params.len());
    let outcome = tokio::select! {
        finished = runner.run(&job, &args.params) => match finished {
            Ok(()) => RunOutcome::Completed,
            Err(err) => RunOutcome::Failed(err),
        },
        cancelled = controller.next_outcome() => RunOutcome::Cancelled(cancelled),
    };
    Ok(outcome)
}

async fn print_banner(server: &str, job: &str) {
    println!("Job will be started on {}", style(server).underlined());
    tokio::time::sleep(BANNER_PACING).await;
    println!("Link: {}", job_link(server, job));
}

fn job_link(server: &str, job: &str) -> String {
    format!("{}/{}", server.trim_end_matches('/'), job_path(job))
}

fn terminal_renderer() -> SharedRenderer {
    if std::io::stdout().is_terminal() {
        shared_renderer(IndicatifRenderer::default())
    } else {
        shared_renderer(PlainRenderer::new(std::io::stdout()))
    }
}
