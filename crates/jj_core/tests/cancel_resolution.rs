use jj_core::{
    outcome_from_stop, queue_fate, CancelOutcome, CancelPlan, ExecutionSession, HistoryEntry,
    QueueFate,
};
use pretty_assertions::assert_eq;

fn entry(number: u64, queue_id: u64, building: bool, result: Option<&str>) -> HistoryEntry {
    HistoryEntry {
        number,
        queue_id,
        building,
        result: result.map(str::to_string),
    }
}

#[test]
fn inactive_session_has_nothing_to_cancel() {
    assert_eq!(CancelPlan::for_session(&ExecutionSession::default()), None);
}

#[test]
fn queued_session_cancels_queue_and_verifies_history() {
    let session = ExecutionSession {
        job: "build-app".to_string(),
        queue_id: 31,
        build_number: 0,
    };
    assert_eq!(
        CancelPlan::for_session(&session),
        Some(CancelPlan {
            job: "build-app".to_string(),
            cancel_queue: Some(31),
            stop_build: None,
            verify_queue: Some(31),
        })
    );
}

#[test]
fn running_session_stops_build_without_history_lookup() {
    let session = ExecutionSession {
        job: "build-app".to_string(),
        queue_id: 31,
        build_number: 9,
    };
    let plan = CancelPlan::for_session(&session).unwrap();
    assert_eq!(plan.cancel_queue, Some(31));
    assert_eq!(plan.stop_build, Some(9));
    assert_eq!(plan.verify_queue, None);
}

#[test]
fn stop_reports_race_when_status_is_not_aborted() {
    assert_eq!(outcome_from_stop("ABORTED"), CancelOutcome::Canceled);
    assert_eq!(
        outcome_from_stop("SUCCESS"),
        CancelOutcome::AlreadyExecuted {
            status: "SUCCESS".to_string()
        }
    );
}

#[test]
fn queue_entry_that_already_ran_reports_its_status() {
    let history = vec![
        entry(8, 29, false, Some("FAILURE")),
        entry(9, 31, false, Some("SUCCESS")),
    ];
    let QueueFate::Settled(outcome) = queue_fate(31, &history) else {
        panic!("expected a settled entry");
    };
    assert_eq!(
        outcome,
        CancelOutcome::AlreadyExecuted {
            status: "SUCCESS".to_string()
        }
    );
    assert_eq!(
        outcome.to_string(),
        "Job already has been executed, status: SUCCESS"
    );
}

#[test]
fn queue_entry_never_started_is_canceled() {
    let history = vec![entry(9, 29, false, Some("SUCCESS"))];
    assert_eq!(queue_fate(31, &history), QueueFate::NeverRan);
}

#[test]
fn queue_entry_aborted_is_canceled() {
    let history = vec![entry(9, 31, false, Some("ABORTED"))];
    assert_eq!(
        queue_fate(31, &history),
        QueueFate::Settled(CancelOutcome::Canceled)
    );
}

#[test]
fn queue_entry_still_building_must_be_stopped() {
    let history = vec![entry(8, 30, false, Some("SUCCESS")), entry(9, 31, true, None)];
    assert_eq!(queue_fate(31, &history), QueueFate::Running { number: 9 });
}
