//! Failure interception tests.
//!
//! These tests verify that failures are reported as notifications with
//! escape codes removed while still propagating to the run result.

use std::time::Duration;

use tokio_test::{assert_err, assert_pending};

use wsk::core::BodyResult;
use wsk::orchestration::Outcome;
use wsk::{Operation, Task, TaskRegistry};

use crate::fixtures::observed_orchestrator;

/// Test: A colored compiler error becomes a clean notification
/// Given build fails with "\x1b[31mError\x1b[0m: TS2304"
/// When build runs
/// Then one notification is titled after the task's error title, with
/// escape codes removed, and the run still fails with the raw message
#[tokio::test]
async fn test_failure_notified_and_propagated() {
    let mut registry = TaskRegistry::new();
    registry
        .register_task(
            Task::new(
                "build",
                Operation::sync(|| Err("\x1b[31mError\x1b[0m: TS2304 cannot find name".into())),
            )
            .with_error_title("TypeScript Compilation Error"),
        )
        .unwrap();
    let (orchestrator, mut notifications) = observed_orchestrator(registry);

    let result = orchestrator.invoke("build").await.unwrap();

    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.title, "TypeScript Compilation Error");
    assert_eq!(notification.message, "Error: TS2304 cannot find name");
    assert!(notifications.try_recv().is_err());
    assert_eq!(
        result.outcome,
        Outcome::failed("\x1b[31mError\x1b[0m: TS2304 cannot find name")
    );
}

/// Test: A panicking body is notified like any other failure
#[tokio::test]
async fn test_panicking_body_notified() {
    let mut registry = TaskRegistry::new();
    registry
        .register_task(
            Task::new("build", Operation::sync(|| panic!("tsc crashed")))
                .with_error_title("TypeScript Compilation Error"),
        )
        .unwrap();
    let (orchestrator, mut notifications) = observed_orchestrator(registry);

    let result = orchestrator.invoke("build").await.unwrap();

    assert_eq!(result.outcome, Outcome::failed("task body panicked: tsc crashed"));
    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.title, "TypeScript Compilation Error");
    assert_eq!(notification.message, "task body panicked: tsc crashed");
}

/// Test: Success produces no notification
#[tokio::test]
async fn test_success_not_notified() {
    let mut registry = TaskRegistry::new();
    registry.register("lint", Operation::noop(), Vec::<String>::new()).unwrap();
    let (orchestrator, mut notifications) = observed_orchestrator(registry);

    assert!(orchestrator.invoke("lint").await.unwrap().is_success());
    assert!(notifications.try_recv().is_err());
}

/// Test: Callback bodies are intercepted and default to "<name> failed"
#[tokio::test]
async fn test_callback_failure_default_title() {
    let mut registry = TaskRegistry::new();
    registry
        .register(
            "bower",
            Operation::callback(|done| done.fail("registry unreachable")),
            Vec::<String>::new(),
        )
        .unwrap();
    let (orchestrator, mut notifications) = observed_orchestrator(registry);

    let result = orchestrator.invoke("bower").await.unwrap();

    assert_err!(result.into_result());
    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.title, "bower failed");
    assert_eq!(notification.message, "registry unreachable");
}

/// Test: A body that never completes keeps the run pending
#[tokio::test]
async fn test_hanging_body_keeps_run_pending() {
    let mut registry = TaskRegistry::new();
    registry
        .register(
            "serve",
            Operation::future(futures::future::pending::<BodyResult>),
            Vec::<String>::new(),
        )
        .unwrap();
    let (orchestrator, _notifications) = observed_orchestrator(registry);

    let outcome = tokio::time::timeout(Duration::from_millis(50), orchestrator.invoke("serve")).await;
    assert!(outcome.is_err(), "run should still be pending");
}

/// Test: A callback body holding its completion forever never resolves
#[test]
fn test_unsignalled_callback_is_pending() {
    let mut registry = TaskRegistry::new();
    registry
        .register(
            "watcher",
            Operation::callback(std::mem::forget),
            Vec::<String>::new(),
        )
        .unwrap();
    let orchestrator = wsk::Orchestrator::new(registry);

    let mut run = tokio_test::task::spawn(orchestrator.invoke("watcher"));
    assert_pending!(run.poll());
    assert_pending!(run.poll());
}
