//! Full pipeline tests: `wsk.toml` to registry to shell bodies.
//!
//! These tests run real `sh` commands in a temporary project directory.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use wsk::config::{Config, FILE_NAME};
use wsk::orchestration::{ChannelSink, ErrorInterceptor, Orchestrator, Outcome, RunEvent};
use wsk::watch::WatchTrigger;

const PROJECT: &str = r#"
notifier = "none"

[tasks.clean]
run = "rm -rf dist && mkdir dist"

[tasks.styles]
run = "echo compiled > dist/style.css"
error_title = "SCSS Compilation Error"

[tasks.lint]
run = "echo linted"

[tasks.build]
run = "echo built > dist/app.js"
deps = ["lint"]
error_title = "TypeScript Compilation Error"

[tasks.html]
run = "cp index.html dist/index.html"

[tasks.copy_fonts]
run = "echo font > dist/font.woff"

[tasks.assets]
deps = ["copy:fonts"]

[tasks.minify]
run = "cat dist/app.js dist/style.css > dist/bundle.min.js"

[composites.default]
deps = ["clean"]
sequence = ["styles", "lint", "build", ["html", "assets"], "minify"]

[[watch]]
paths = ["src/**/*.scss"]
tasks = ["styles"]
"#;

fn project(config: &str) -> (TempDir, Config) {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(FILE_NAME), config).unwrap();
    std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
    let config = Config::load(&dir.path().join(FILE_NAME)).unwrap();
    (dir, config)
}

fn orchestrator(root: &Path, config: &Config) -> Orchestrator {
    Orchestrator::new(config.build_registry(root).unwrap())
}

/// Test: The default composite produces every artifact
#[tokio::test]
async fn test_default_composite_from_config() {
    let (dir, config) = project(PROJECT);
    let orchestrator = orchestrator(dir.path(), &config);

    let result = orchestrator.invoke("default").await.unwrap();

    assert!(result.is_success(), "{:?}", result);
    let bundle = std::fs::read_to_string(dir.path().join("dist/bundle.min.js")).unwrap();
    assert_eq!(bundle, "built\ncompiled\n");
    assert!(dir.path().join("dist/index.html").exists());
    // The assets step runs only the aggregate body, not copy:fonts.
    assert!(!dir.path().join("dist/font.woff").exists());
}

/// Test: A graph run of an aggregate pulls in renamed sub-tasks
#[tokio::test]
async fn test_aggregate_runs_renamed_dependency() {
    let (dir, config) = project(PROJECT);
    std::fs::create_dir(dir.path().join("dist")).unwrap();
    let orchestrator = orchestrator(dir.path(), &config);

    let result = orchestrator.invoke("assets").await.unwrap();

    assert_eq!(result.task_names(), vec!["copy:fonts", "assets"]);
    assert!(dir.path().join("dist/font.woff").exists());
}

/// Test: Shell stdout is reported as task progress
#[tokio::test]
async fn test_shell_progress_events() {
    let (dir, config) = project(PROJECT);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let orchestrator = orchestrator(dir.path(), &config).with_events(tx);

    orchestrator.invoke("lint").await.unwrap();
    drop(orchestrator);

    let mut progress = Vec::new();
    while let Some(event) = rx.recv().await {
        if let RunEvent::TaskProgress { task, message } = event {
            progress.push((task, message));
        }
    }
    assert_eq!(progress, vec![("lint".to_string(), "linted".to_string())]);
}

/// Test: A failing command is reported under the default title
#[tokio::test]
async fn test_failing_command_notifies() {
    let (dir, config) = project(
        r#"
[tasks.lint]
run = "echo 'src/app.ts: missing semicolon' >&2; false"

[tasks.build]
run = "echo never > built.txt"
deps = ["lint"]
error_title = "TypeScript Compilation Error"
"#,
    );
    let (sink, mut notifications) = ChannelSink::new();
    let orchestrator =
        orchestrator(dir.path(), &config).with_interceptor(ErrorInterceptor::new(Arc::new(sink)));

    let result = orchestrator.invoke("build").await.unwrap();

    assert_eq!(result.failed_task(), Some("lint"));
    assert!(!dir.path().join("built.txt").exists());
    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.title, "lint failed");
    assert!(notification.message.contains("missing semicolon"));
    match result.outcome {
        Outcome::Failed { error } => assert!(error.contains("exited with")),
        Outcome::Succeeded => panic!("lint should fail"),
    }
}

/// Test: A watch event runs the mapped task
#[tokio::test]
async fn test_watch_dispatch_runs_task() {
    let (dir, config) = project(PROJECT);
    std::fs::create_dir(dir.path().join("dist")).unwrap();
    let orchestrator = orchestrator(dir.path(), &config);
    let trigger = WatchTrigger::from_config(dir.path(), &config.watch).unwrap();

    let changed = dir.path().join("src/scss/style.scss");
    let runs = trigger.dispatch(&orchestrator, &changed).await;

    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].0, "styles");
    assert!(runs[0].1.as_ref().unwrap().is_success());
    assert!(dir.path().join("dist/style.css").exists());

    let ignored = trigger
        .dispatch(&orchestrator, &dir.path().join("README.md"))
        .await;
    assert!(ignored.is_empty());
}

/// Test: Structural problems in the config surface before running
#[tokio::test]
async fn test_config_cycle_is_rejected() {
    let (dir, config) = project(
        r#"
[tasks.a]
run = "touch a.txt"
deps = ["b"]

[tasks.b]
run = "touch b.txt"
deps = ["a"]
"#,
    );
    let orchestrator = orchestrator(dir.path(), &config);

    let err = orchestrator.invoke("a").await.unwrap_err();

    assert!(matches!(err, wsk::Error::CyclicDependency(_)));
    assert!(!dir.path().join("a.txt").exists());
}
