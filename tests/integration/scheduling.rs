//! Dependency scheduler correctness tests.
//!
//! These tests verify staging, once-per-run execution, failure
//! propagation between stages and real concurrency within a stage.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use wsk::orchestration::{DependencyScheduler, Outcome, RunEvent};
use wsk::{Error, Operation, Orchestrator, TaskRegistry};

use crate::fixtures::{web_app_registry, ConcurrencyProbe, Recorder};

fn scheduler(registry: TaskRegistry) -> DependencyScheduler {
    DependencyScheduler::new(Arc::new(registry))
}

/// Test: Every task in the closure runs exactly once
/// Given minify -> {build -> lint, styles}
/// When minify runs
/// Then each of the four bodies starts once, and dependencies finish first
#[tokio::test]
async fn test_closure_runs_each_task_once() {
    let recorder = Recorder::new();
    let result = scheduler(web_app_registry(&recorder, &[]))
        .run("minify")
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.task_names(), vec!["lint", "styles", "build", "minify"]);
    for task in ["lint", "styles", "build", "minify"] {
        assert_eq!(recorder.starts(task), 1, "{} should start once", task);
    }
    assert_eq!(recorder.starts("html"), 0);
    assert!(recorder.position("end:lint") < recorder.position("start:build"));
    assert!(recorder.position("end:build") < recorder.position("start:minify"));
    assert!(recorder.position("end:styles") < recorder.position("start:minify"));
}

/// Test: Diamond dependencies run the shared root once
#[tokio::test]
async fn test_diamond_shared_dependency_once() {
    let recorder = Recorder::new();
    let mut registry = TaskRegistry::new();
    registry.register("a", recorder.ok("a"), Vec::<String>::new()).unwrap();
    registry.register("b", recorder.ok("b"), ["a"]).unwrap();
    registry.register("c", recorder.ok("c"), ["a"]).unwrap();
    registry.register("d", recorder.ok("d"), ["b", "c"]).unwrap();

    let result = scheduler(registry).run("d").await.unwrap();

    assert_eq!(result.task_names(), vec!["a", "b", "c", "d"]);
    assert_eq!(recorder.starts("a"), 1);
}

/// Test: A cycle is reported before anything runs
/// Given a <-> b and an unrelated task x
/// When x runs
/// Then the run fails with CyclicDependency and no body starts
#[tokio::test]
async fn test_cycle_prevents_all_execution() {
    let recorder = Recorder::new();
    let mut registry = TaskRegistry::new();
    registry.register("a", recorder.ok("a"), ["b"]).unwrap();
    registry.register("b", recorder.ok("b"), ["a"]).unwrap();
    registry.register("x", recorder.ok("x"), Vec::<String>::new()).unwrap();

    let err = scheduler(registry).run("x").await.unwrap_err();

    assert!(matches!(err, Error::CyclicDependency(_)));
    assert!(recorder.entries().is_empty());
}

/// Test: Unknown dependencies surface at run time
#[tokio::test]
async fn test_unknown_dependency_prevents_execution() {
    let recorder = Recorder::new();
    let mut registry = TaskRegistry::new();
    registry.register("minify", recorder.ok("minify"), ["build"]).unwrap();

    let err = scheduler(registry).run("minify").await.unwrap_err();

    match err {
        Error::UnknownDependency { task, dependency } => {
            assert_eq!(task, "minify");
            assert_eq!(dependency, "build");
        }
        other => panic!("expected UnknownDependency, got {:?}", other),
    }
    assert!(recorder.entries().is_empty());
}

/// Test: A failed dependency stops its dependents
/// Given build -> lint where lint fails
/// When build runs
/// Then build never starts and the result carries lint's error
#[tokio::test]
async fn test_failed_dependency_skips_dependents() {
    let recorder = Recorder::new();
    let result = scheduler(web_app_registry(&recorder, &["lint"]))
        .run("build")
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::failed("lint broke"));
    assert_eq!(result.failed_task(), Some("lint"));
    assert!(result.outcome_of("build").is_none());
    assert_eq!(recorder.starts("build"), 0);
}

/// Test: A failing member does not cancel its stage siblings
#[tokio::test]
async fn test_failure_does_not_cancel_siblings() {
    let recorder = Recorder::new();
    let mut registry = TaskRegistry::new();
    registry
        .register("fast", recorder.body("fast", Duration::from_millis(1), true), Vec::<String>::new())
        .unwrap();
    registry
        .register("slow", recorder.body("slow", Duration::from_millis(50), false), Vec::<String>::new())
        .unwrap();
    registry.register("after", recorder.ok("after"), ["fast", "slow"]).unwrap();

    let result = scheduler(registry).run("after").await.unwrap();

    assert!(!result.is_success());
    assert_eq!(result.outcome_of("slow"), Some(&Outcome::Succeeded));
    assert!(recorder.position("end:slow").is_some());
    assert_eq!(recorder.starts("after"), 0);
}

/// Test: A panicking body fails only its own task
/// Given bundle panics and copy succeeds in the same stage
/// When release runs on a spawned task
/// Then the run returns a result with bundle failed and copy succeeded
#[tokio::test]
async fn test_panicking_body_is_task_failure() {
    let recorder = Recorder::new();
    let mut registry = TaskRegistry::new();
    registry
        .register(
            "bundle",
            Operation::future(|| async { panic!("bundle crashed") }),
            Vec::<String>::new(),
        )
        .unwrap();
    registry
        .register("copy", recorder.body("copy", Duration::from_millis(20), false), Vec::<String>::new())
        .unwrap();
    registry.register("release", recorder.ok("release"), ["bundle", "copy"]).unwrap();
    let orchestrator = Arc::new(Orchestrator::new(registry));

    let run = Arc::clone(&orchestrator);
    let result = tokio::spawn(async move { run.invoke("release").await })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.failed_task(), Some("bundle"));
    assert_eq!(
        result.outcome_of("bundle"),
        Some(&Outcome::failed("task body panicked: bundle crashed"))
    );
    assert_eq!(result.outcome_of("copy"), Some(&Outcome::Succeeded));
    assert_eq!(recorder.starts("release"), 0);
}

/// Test: Members of a stage actually overlap
#[tokio::test]
async fn test_stage_members_run_concurrently() {
    let probe = ConcurrencyProbe::new();
    let mut registry = TaskRegistry::new();
    registry
        .register("html", probe.body(Duration::from_millis(50)), Vec::<String>::new())
        .unwrap();
    registry
        .register("assets", probe.body(Duration::from_millis(50)), Vec::<String>::new())
        .unwrap();
    registry
        .register("site", wsk::Operation::noop(), ["html", "assets"])
        .unwrap();

    let result = scheduler(registry).run("site").await.unwrap();

    assert!(result.is_success());
    assert_eq!(probe.max(), 2);
}

/// Test: The recorded result does not depend on completion order
#[tokio::test]
async fn test_result_independent_of_interleaving() {
    let mut names = Vec::new();
    for (a_delay, b_delay) in [(40, 1), (1, 40)] {
        let recorder = Recorder::new();
        let mut registry = TaskRegistry::new();
        registry
            .register("a", recorder.body("a", Duration::from_millis(a_delay), false), Vec::<String>::new())
            .unwrap();
        registry
            .register("b", recorder.body("b", Duration::from_millis(b_delay), false), Vec::<String>::new())
            .unwrap();
        registry.register("c", recorder.ok("c"), ["a", "b"]).unwrap();

        let result = scheduler(registry).run("c").await.unwrap();
        names.push(
            result
                .task_names()
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(names[0], names[1]);
    assert_eq!(names[0], vec!["a", "b", "c"]);
}

/// Test: A body-less aggregate waits for its dependencies
#[tokio::test]
async fn test_aggregate_task() {
    let recorder = Recorder::new();
    let result = scheduler(web_app_registry(&recorder, &[]))
        .run("assets")
        .await
        .unwrap();

    assert_eq!(result.task_names(), vec!["copy", "fonts", "images", "assets"]);
    assert!(result.is_success());
}

/// Test: Run events describe stages and finish with RunFinished
#[tokio::test]
async fn test_run_events() {
    let recorder = Recorder::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = scheduler(web_app_registry(&recorder, &[])).with_events(tx);

    scheduler.run("build").await.unwrap();
    drop(scheduler);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(
        events.first(),
        Some(&RunEvent::StageStarted {
            index: 0,
            tasks: vec!["lint".to_string()]
        })
    );
    assert_eq!(
        events.last(),
        Some(&RunEvent::RunFinished {
            outcome: Outcome::Succeeded
        })
    );
    let started = events
        .iter()
        .filter(|e| matches!(e, RunEvent::TaskStarted { .. }))
        .count();
    assert_eq!(started, 2);
}

/// Test: The callback API reports exactly once
#[tokio::test]
async fn test_run_with_callback() {
    let recorder = Recorder::new();
    let scheduler = scheduler(web_app_registry(&recorder, &[]));

    let mut calls = 0;
    scheduler
        .run_with_callback("lint", |result| {
            calls += 1;
            tokio_test::assert_ok!(result);
        })
        .await;
    assert_eq!(calls, 1);

    let mut unknown = None;
    scheduler
        .run_with_callback("deploy", |result| unknown = Some(result))
        .await;
    assert!(matches!(unknown, Some(Err(Error::UnknownTask(_)))));
}
