//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Recording task bodies that log start/finish order
//! - Concurrency probes that measure overlap
//! - The sample web-app registry (styles, lint, build, html, assets, ...)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wsk::orchestration::{ChannelSink, ErrorInterceptor, Notification, Orchestrator};
use wsk::{Composite, Operation, SequenceSpec, TaskError, TaskRegistry};

/// Shared log of task bodies as they run.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// How many times `task` started.
    pub fn starts(&self, task: &str) -> usize {
        let marker = format!("start:{}", task);
        self.entries().iter().filter(|e| **e == marker).count()
    }

    /// Position of an entry, for ordering assertions.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    /// Async body that records `start:NAME`, sleeps, then records
    /// `end:NAME` and succeeds or fails.
    pub fn body(&self, name: &str, delay: Duration, fail: bool) -> Operation {
        let recorder = self.clone();
        let name = name.to_string();
        Operation::future(move || {
            let recorder = recorder.clone();
            let name = name.clone();
            async move {
                recorder.push(format!("start:{}", name));
                tokio::time::sleep(delay).await;
                recorder.push(format!("end:{}", name));
                if fail {
                    Err(TaskError::new(format!("{} broke", name)))
                } else {
                    Ok(())
                }
            }
        })
    }

    pub fn ok(&self, name: &str) -> Operation {
        self.body(name, Duration::from_millis(1), false)
    }

    pub fn failing(&self, name: &str) -> Operation {
        self.body(name, Duration::from_millis(1), true)
    }
}

/// Tracks how many bodies are inside their critical section at once.
#[derive(Clone, Default)]
pub struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn body(&self, delay: Duration) -> Operation {
        let probe = self.clone();
        Operation::future(move || {
            let probe = probe.clone();
            async move {
                let now = probe.current.fetch_add(1, Ordering::SeqCst) + 1;
                probe.max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                probe.current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }
}

/// The sample web-app task set with every body recorded.
///
/// `failing` names tasks whose body fails.
pub fn web_app_registry(recorder: &Recorder, failing: &[&str]) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    let mut add = |name: &str, deps: &[&str]| {
        let body = if failing.contains(&name) {
            recorder.failing(name)
        } else {
            recorder.ok(name)
        };
        registry
            .register(name, body, deps.iter().copied())
            .unwrap();
    };

    add("bower", &[]);
    add("clean", &[]);
    add("styles", &[]);
    add("lint", &[]);
    add("build", &["lint"]);
    add("html", &[]);
    add("copy", &[]);
    add("images", &[]);
    add("fonts", &[]);
    add("minify", &["build", "styles"]);
    registry
        .register_task(wsk::Task::aggregate("assets", ["copy", "images", "fonts"]))
        .unwrap();

    registry
        .register_composite(
            Composite::new(
                "default",
                SequenceSpec::default()
                    .then("styles")
                    .then("lint")
                    .then("build")
                    .then_group(["html", "assets"])
                    .then("minify"),
            )
            .with_prerequisites(["clean"]),
        )
        .unwrap();
    registry
        .register_composite(
            Composite::new("full", SequenceSpec::default().then("default"))
                .with_prerequisites(["bower"]),
        )
        .unwrap();
    registry
}

/// Orchestrator whose failure notifications land in a channel.
pub fn observed_orchestrator(
    registry: TaskRegistry,
) -> (Orchestrator, tokio::sync::mpsc::UnboundedReceiver<Notification>) {
    let (sink, notifications) = ChannelSink::new();
    let orchestrator =
        Orchestrator::new(registry).with_interceptor(ErrorInterceptor::new(Arc::new(sink)));
    (orchestrator, notifications)
}
