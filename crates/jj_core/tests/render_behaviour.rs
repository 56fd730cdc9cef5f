use std::sync::Once;

use jj_core::{update, BarCommand, FinishTag, RenderState, RenderUpdate, FAILED_MIN_LINES};
use pretty_assertions::assert_eq;

const JOB_URL: &str = "https://ci.example.com/job/build-app/7/console";

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(jj_logging::initialize_for_tests);
}

fn apply_all(updates: Vec<RenderUpdate>) -> (RenderState, Vec<BarCommand>) {
    let mut state = RenderState::new(JOB_URL);
    let mut commands = state.start();
    for msg in updates {
        let (next, cmds) = update(state, msg);
        state = next;
        commands.extend(cmds);
    }
    (state, commands)
}

#[test]
fn first_render_draws_bar_and_ticks_once() {
    init_logging();
    let mut state = RenderState::new(JOB_URL);
    assert_eq!(
        state.start(),
        vec![
            BarCommand::Start {
                label: "running...".to_string()
            },
            BarCommand::Tick,
        ]
    );
    assert_eq!(state.percent(), 1);
    assert!(state.start().is_empty());
}

#[test]
fn update_before_start_renders_the_bar_first() {
    init_logging();
    let (state, commands) = update(RenderState::new(JOB_URL), RenderUpdate::Tick);
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[2], BarCommand::Tick);
    assert_eq!(state.percent(), 2);
}

#[test]
fn messages_interrupt_and_empty_messages_tick() {
    init_logging();
    let (_state, commands) = apply_all(vec![
        RenderUpdate::Message("[INFO] compiling".to_string()),
        RenderUpdate::Message(String::new()),
    ]);
    assert_eq!(
        &commands[2..],
        &[
            BarCommand::Interrupt("[INFO] compiling".to_string()),
            BarCommand::Tick
        ]
    );
}

#[test]
fn newline_keystrokes_grow_the_allotment() {
    init_logging();
    let (state, commands) = apply_all(vec![RenderUpdate::LineDelta(1), RenderUpdate::LineDelta(1)]);
    assert_eq!(state.lines(), 3);
    assert_eq!(commands.last(), Some(&BarCommand::SetLines(3)));
}

#[test]
fn success_finish_clears_and_reports_result() {
    init_logging();
    let (state, commands) = apply_all(vec![RenderUpdate::Finish {
        tag: FinishTag::Success,
        summary: "SUCCESS".to_string(),
    }]);
    assert!(state.is_finished());
    assert_eq!(state.percent(), 100);
    assert_eq!(
        &commands[2..],
        &[
            BarCommand::ClearLine,
            BarCommand::SetFormat(format!("{JOB_URL}: SUCCESS")),
            BarCommand::Done,
        ]
    );
}

#[test]
fn failure_finish_grows_lines_and_marks_failure() {
    init_logging();
    let (state, commands) = apply_all(vec![RenderUpdate::Finish {
        tag: FinishTag::Failed,
        summary: "FAILURE".to_string(),
    }]);
    assert_eq!(state.lines(), FAILED_MIN_LINES);
    assert_eq!(
        &commands[2..],
        &[
            BarCommand::SetLines(FAILED_MIN_LINES),
            BarCommand::SetFormat(format!("{JOB_URL}: FAILURE")),
            BarCommand::Done,
            BarCommand::MarkFailed,
        ]
    );
}

#[test]
fn failure_with_large_allotment_keeps_it() {
    init_logging();
    let (state, commands) = apply_all(vec![
        RenderUpdate::LineDelta(6),
        RenderUpdate::Finish {
            tag: FinishTag::Failed,
            summary: "FAILURE".to_string(),
        },
    ]);
    assert_eq!(state.lines(), 7);
    assert!(!commands[3..].contains(&BarCommand::SetLines(FAILED_MIN_LINES)));
}

#[test]
fn nothing_is_rendered_after_finish() {
    init_logging();
    let (state, _) = apply_all(vec![RenderUpdate::Finish {
        tag: FinishTag::Success,
        summary: "SUCCESS".to_string(),
    }]);
    let (state, commands) = update(state, RenderUpdate::Message("late line".to_string()));
    assert!(commands.is_empty());
    let (_state, commands) = update(
        state,
        RenderUpdate::Finish {
            tag: FinishTag::Failed,
            summary: "FAILURE".to_string(),
        },
    );
    assert!(commands.is_empty());
}

#[test]
fn ticks_stop_short_of_done() {
    init_logging();
    let (state, commands) = apply_all(vec![RenderUpdate::Tick; 150]);
    assert_eq!(state.percent(), 99);
    let ticks = commands.iter().filter(|c| **c == BarCommand::Tick).count();
    assert_eq!(ticks, 99);
}
