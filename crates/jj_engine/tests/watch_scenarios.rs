mod support;

use std::sync::Arc;

use jj_core::{BarCommand, SubstringFilter};
use jj_engine::{
    shared_renderer, BuildWatcher, Discovery, JobProperty, JobRunner, ParameterDefinition,
    ParameterValue, ProjectRef, QueueItem, SessionHandle, WatchError, WatchEvent,
};
use pretty_assertions::assert_eq;
use support::*;

struct Harness {
    api: Arc<FakeJenkins>,
    renderer: RecordingRenderer,
    sink: Arc<CollectingSink>,
    post_check: Arc<RecordingPostCheck>,
    session: SessionHandle,
}

impl Harness {
    fn new(api: FakeJenkins) -> Self {
        init_logging();
        Self {
            api: Arc::new(api),
            renderer: RecordingRenderer::default(),
            sink: Arc::new(CollectingSink::default()),
            post_check: Arc::new(RecordingPostCheck::default()),
            session: SessionHandle::new(),
        }
    }

    fn watcher(&self) -> BuildWatcher {
        BuildWatcher::new(
            self.api.clone(),
            self.session.clone(),
            shared_renderer(self.renderer.clone()),
            self.sink.clone(),
            Arc::new(SubstringFilter::default()),
        )
        .with_settings(fast_settings())
        .with_post_check(self.post_check.clone())
    }

    fn runner(&self) -> JobRunner {
        JobRunner::new(self.watcher())
    }
}

fn command(c: BarCommand) -> Recorded {
    Recorded::Command(c)
}

fn interrupt(text: &str) -> Recorded {
    command(BarCommand::Interrupt(text.to_string()))
}

fn start() -> Recorded {
    command(BarCommand::Start {
        label: "running...".to_string(),
    })
}

fn parent_with_child() -> FakeJenkins {
    FakeJenkins::new().with(|state| {
        state
            .jobs
            .insert("build-app".to_string(), job("build-app", 11, &["deploy-app"]));
        state
            .jobs
            .insert("deploy-app".to_string(), job("deploy-app", 4, &[]));
        state
            .last_success
            .insert("build-app".to_string(), finished(11, "SUCCESS"));
        state
            .queue_items
            .insert(101, vec![waiting(101), assigned(101, 12)].into());
    })
}

#[tokio::test(start_paused = true)]
async fn successful_parent_hands_over_to_its_downstream_build() {
    let harness = Harness::new(parent_with_child());
    harness.api.script_build(
        "build-app",
        12,
        vec![Ok(running(12)), Ok(running(12)), Ok(finished(12, "SUCCESS"))],
    );
    harness
        .api
        .script_console("build-app", 12, &["Started\nCompiling\n", "<b>Done</b>\n"]);
    harness.api.script_build(
        "deploy-app",
        4,
        vec![Ok(caused_by(finished(4, "SUCCESS"), "build-app", 12))],
    );
    harness.api.script_build(
        "deploy-app",
        3,
        vec![Ok(caused_by(finished(3, "SUCCESS"), "build-app", 10))],
    );

    harness.runner().run("build-app", &[]).await.unwrap();

    assert_eq!(
        harness.sink.take(),
        vec![
            WatchEvent::Triggered {
                job: "build-app".to_string(),
                queue_id: 101
            },
            WatchEvent::WaitingForExecutor {
                job: "build-app".to_string(),
                queue_id: 101
            },
            WatchEvent::ExecutorAssigned {
                job: "build-app".to_string(),
                build_number: 12
            },
            WatchEvent::BuildFinished {
                job: "build-app".to_string(),
                build_number: 12,
                result: "SUCCESS".to_string()
            },
            WatchEvent::DownstreamFound {
                child: "deploy-app".to_string(),
                discovery: Discovery::History { build_number: 4 }
            },
            WatchEvent::BuildFinished {
                job: "deploy-app".to_string(),
                build_number: 4,
                result: "SUCCESS".to_string()
            },
            WatchEvent::ChainDone {
                job: "build-app".to_string()
            },
        ]
    );
    assert_eq!(
        harness.renderer.significant(),
        vec![
            start(),
            interrupt("Started"),
            interrupt("Compiling"),
            interrupt("Done"),
            command(BarCommand::ClearLine),
            command(BarCommand::SetFormat(
                "http://fake/job/build-app/12/console: SUCCESS".to_string()
            )),
            command(BarCommand::Done),
            start(),
            command(BarCommand::ClearLine),
            command(BarCommand::SetFormat(
                "http://fake/job/deploy-app/4/console: SUCCESS".to_string()
            )),
            command(BarCommand::Done),
        ]
    );
    assert_eq!(
        *harness.post_check.jobs.lock().unwrap(),
        vec!["build-app".to_string(), "deploy-app".to_string()]
    );
    assert!(!harness.session.snapshot().is_active());
}

#[tokio::test(start_paused = true)]
async fn downstream_found_in_queue_waits_for_its_executor() {
    let harness = Harness::new(parent_with_child().with(|state| {
        state
            .queue
            .push(queued_child(205, "deploy-app", "build-app", 12));
        state
            .queue_items
            .insert(205, vec![waiting(205), assigned(205, 5)].into());
    }));
    harness
        .api
        .script_build("build-app", 12, vec![Ok(finished(12, "SUCCESS"))]);
    harness
        .api
        .script_build("deploy-app", 5, vec![Ok(running(5)), Ok(finished(5, "SUCCESS"))]);

    harness.runner().run("build-app", &[]).await.unwrap();

    let events = harness.sink.take();
    assert!(events.contains(&WatchEvent::DownstreamFound {
        child: "deploy-app".to_string(),
        discovery: Discovery::Queue { queue_id: 205 }
    }));
    assert!(events.contains(&WatchEvent::ExecutorAssigned {
        job: "deploy-app".to_string(),
        build_number: 5
    }));
}

fn queued_child(id: u64, child: &str, parent: &str, parent_build: u64) -> QueueItem {
    let build = caused_by(finished(0, "SUCCESS"), parent, parent_build);
    QueueItem {
        id,
        task: Some(ProjectRef {
            name: child.to_string(),
        }),
        actions: build.actions,
        ..QueueItem::default()
    }
}

#[tokio::test(start_paused = true)]
async fn failed_parent_stops_the_chain() {
    let harness = Harness::new(parent_with_child());
    harness.api.script_build(
        "build-app",
        12,
        vec![Ok(running(12)), Ok(finished(12, "FAILURE"))],
    );
    harness
        .api
        .script_console("build-app", 12, &["ERROR: tests failed\n"]);

    let err = harness.runner().run("build-app", &[]).await.unwrap_err();
    match err {
        WatchError::JobFailed { job, result } => {
            assert_eq!(job, "build-app");
            assert_eq!(result, "FAILURE");
        }
        other => panic!("unexpected {other:?}"),
    }

    let recorded = harness.renderer.significant();
    assert_eq!(
        recorded[recorded.len() - 4..].to_vec(),
        vec![
            command(BarCommand::SetLines(10)),
            command(BarCommand::SetFormat(
                "http://fake/job/build-app/12/console: FAILURE".to_string()
            )),
            command(BarCommand::Done),
            command(BarCommand::MarkFailed),
        ]
    );
    assert!(harness.post_check.jobs.lock().unwrap().is_empty());
    assert!(!harness
        .api
        .snapshot(|state| state.job_info_calls.contains(&"deploy-app".to_string())));
}

#[tokio::test(start_paused = true)]
async fn unreachable_build_status_gives_up_after_budget() {
    let harness = Harness::new(parent_with_child());
    harness
        .api
        .script_build("build-app", 12, vec![Err(not_found("build"))]);

    let err = harness.runner().run("build-app", &[]).await.unwrap_err();
    assert!(matches!(
        err,
        WatchError::PollBudgetExceeded {
            build_number: 12,
            ..
        }
    ));
    let recorded = harness.renderer.significant();
    assert_eq!(
        recorded.last(),
        Some(&command(BarCommand::MarkFailed))
    );
    assert!(recorded.contains(&command(BarCommand::SetFormat(
        "http://fake/job/build-app/12/console: failed".to_string()
    ))));
}

#[tokio::test(start_paused = true)]
async fn short_poll_outage_is_tolerated() {
    let harness = Harness::new(parent_with_child());
    harness.api.script_build(
        "build-app",
        12,
        vec![
            Err(not_found("build")),
            Err(not_found("build")),
            Ok(running(12)),
            Err(not_found("build")),
            Ok(finished(12, "SUCCESS")),
        ],
    );
    harness.api.script_build(
        "deploy-app",
        4,
        vec![Ok(caused_by(finished(4, "SUCCESS"), "build-app", 12))],
    );

    harness.runner().run("build-app", &[]).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn skip_marker_in_console_disables_post_check() {
    let harness = Harness::new(FakeJenkins::new().with(|state| {
        state
            .jobs
            .insert("web".to_string(), job("web", 1, &[]));
        state
            .queue_items
            .insert(101, vec![assigned(101, 2)].into());
    }));
    harness
        .api
        .script_build("web", 2, vec![Ok(running(2)), Ok(finished(2, "SUCCESS"))]);
    harness
        .api
        .script_console("web", 2, &["$ yarn build\nWebpack compiled\n"]);

    harness.runner().run("web", &[]).await.unwrap();

    assert!(harness.post_check.jobs.lock().unwrap().is_empty());
    assert!(harness.sink.take().contains(&WatchEvent::PostCheckSkipped {
        job: "web".to_string()
    }));
}

#[tokio::test(start_paused = true)]
async fn declared_parameters_are_submitted_with_defaults() {
    let harness = Harness::new(FakeJenkins::new().with(|state| {
        let mut info = job("api", 1, &[]);
        info.property = vec![JobProperty {
            parameter_definitions: vec![
                ParameterDefinition {
                    name: "BRANCH".to_string(),
                    kind: "StringParameterDefinition".to_string(),
                    default_parameter_value: Some(ParameterValue {
                        name: Some("BRANCH".to_string()),
                        value: serde_json::json!("main"),
                    }),
                    choices: Vec::new(),
                },
                ParameterDefinition {
                    name: "DRY_RUN".to_string(),
                    kind: "BooleanParameterDefinition".to_string(),
                    default_parameter_value: Some(ParameterValue {
                        name: Some("DRY_RUN".to_string()),
                        value: serde_json::json!(false),
                    }),
                    choices: Vec::new(),
                },
            ],
        }];
        state.jobs.insert("api".to_string(), info);
        state
            .queue_items
            .insert(101, vec![assigned(101, 2)].into());
    }));
    harness
        .api
        .script_build("api", 2, vec![Ok(finished(2, "SUCCESS"))]);

    harness
        .runner()
        .run("api", &[("BRANCH".to_string(), "release".to_string())])
        .await
        .unwrap();

    let triggered = harness.api.snapshot(|state| state.triggered.clone());
    assert_eq!(
        triggered,
        vec![(
            "api".to_string(),
            vec![
                ("BRANCH".to_string(), "release".to_string()),
                ("DRY_RUN".to_string(), "false".to_string()),
            ]
        )]
    );
}

#[tokio::test]
async fn unknown_job_is_reported_before_triggering() {
    let harness = Harness::new(FakeJenkins::new());
    let err = harness.runner().run("ghost", &[]).await.unwrap_err();
    assert!(matches!(err, WatchError::JobNotFound(ref job) if job == "ghost"));
    assert!(harness.api.snapshot(|state| state.triggered.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn verbose_mode_batches_console_lines() {
    let harness = Harness::new(FakeJenkins::new().with(|state| {
        state.jobs.insert("svc".to_string(), job("svc", 1, &[]));
        state
            .queue_items
            .insert(101, vec![assigned(101, 2)].into());
    }));
    harness
        .api
        .script_build("svc", 2, vec![Ok(running(2)), Ok(finished(2, "SUCCESS"))]);
    harness
        .api
        .script_console("svc", 2, &["a\nb\nc\nd\n"]);

    let mut settings = fast_settings();
    settings.verbose = true;
    let watcher = harness.watcher().with_settings(settings);
    JobRunner::new(watcher).run("svc", &[]).await.unwrap();

    let interrupts: Vec<Recorded> = harness
        .renderer
        .significant()
        .into_iter()
        .filter(|r| matches!(r, Recorded::Command(BarCommand::Interrupt(_))))
        .collect();
    assert_eq!(interrupts, vec![interrupt("a\nb\nc"), interrupt("d")]);
}

#[tokio::test(start_paused = true)]
async fn progress_ticks_stay_below_done_while_running() {
    let harness = Harness::new(FakeJenkins::new().with(|state| {
        state.jobs.insert("slow".to_string(), job("slow", 1, &[]));
        let mut reference = finished(1, "SUCCESS");
        reference.duration = 500;
        state.last_success.insert("slow".to_string(), reference);
        state
            .queue_items
            .insert(101, vec![assigned(101, 2)].into());
    }));
    let mut script = vec![Ok(running(2)); 200];
    script.push(Ok(finished(2, "SUCCESS")));
    harness.api.script_build("slow", 2, script);

    harness.runner().run("slow", &[]).await.unwrap();

    let ticks = harness
        .renderer
        .log
        .lock()
        .unwrap()
        .iter()
        .filter(|r| matches!(r, Recorded::Command(BarCommand::Tick)))
        .count();
    // One tick from the start, then at most up to 99 percent.
    assert!(ticks >= 2, "expected time-based ticks, saw {ticks}");
    assert!(ticks <= 99, "ticks must stop below done, saw {ticks}");
}
