use std::sync::Mutex;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn test_closure_observer_receives_reports() {
    let seen = Mutex::new(Vec::new());
    let observer = |report: &ProgressReport| seen.lock().unwrap().push((report.phase, report.percent));
    let mut reporter = ProgressReporter::new("install", Some(&observer));

    reporter.enter(LifecyclePhase::Validating, "checking");
    reporter.enter(LifecyclePhase::Loading, "loading");
    reporter.enter(LifecyclePhase::Complete, "done");

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (LifecyclePhase::Validating, 5),
            (LifecyclePhase::Loading, 65),
            (LifecyclePhase::Complete, 100),
        ]
    );
}

#[test]
fn test_backwards_and_post_terminal_transitions_ignored() {
    let seen = Mutex::new(Vec::new());
    let observer = |report: &ProgressReport| seen.lock().unwrap().push(report.phase);
    let mut reporter = ProgressReporter::new("reload", Some(&observer));

    reporter.enter(LifecyclePhase::Loading, "");
    reporter.enter(LifecyclePhase::Processing, "");
    reporter.fail("boom");
    reporter.enter(LifecyclePhase::Complete, "");

    assert_eq!(*seen.lock().unwrap(), vec![LifecyclePhase::Loading, LifecyclePhase::Error]);
    assert_eq!(reporter.phase(), Some(LifecyclePhase::Error));
}

#[test]
fn test_repeated_phase_reports_explicit_percent() {
    let seen = Mutex::new(Vec::new());
    let observer = |report: &ProgressReport| seen.lock().unwrap().push(report.percent);
    let mut reporter = ProgressReporter::new("load_all", Some(&observer));

    reporter.enter_at(LifecyclePhase::Loading, "1/2", 65);
    reporter.enter_at(LifecyclePhase::Loading, "2/2", 82);
    reporter.enter_at(LifecyclePhase::Complete, "done", 250);

    assert_eq!(*seen.lock().unwrap(), vec![65, 82, 100]);
}

fn panicking_observer(_: &ProgressReport) {
    panic!("observer bug");
}

#[test]
fn test_panicking_observer_is_contained() {
    let mut reporter = ProgressReporter::new("install", Some(&panicking_observer));

    reporter.enter(LifecyclePhase::Validating, "");
    reporter.enter(LifecyclePhase::Complete, "");

    assert_eq!(reporter.phase(), Some(LifecyclePhase::Complete));
}

#[test]
fn test_phase_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&LifecyclePhase::Registering).unwrap(),
        "\"registering\""
    );
    assert_eq!(LifecyclePhase::Downloading.to_string(), "downloading");
}
