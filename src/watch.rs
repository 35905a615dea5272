//! Filesystem watch trigger.
//!
//! Maps glob path patterns to task names. Every create or modify event
//! whose path matches a rule invokes each of the rule's tasks once through
//! the [`Orchestrator`]. Events are neither debounced nor coalesced.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use glob::Pattern;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::WatchConfig;
use crate::orchestration::{Orchestrator, RunResult};
use crate::{wlog, wlog_debug, wlog_error, wlog_warn, Result};

/// One rule: any of `patterns` matching triggers every task in `tasks`.
#[derive(Debug, Clone)]
pub struct WatchRule {
    pub patterns: Vec<Pattern>,
    pub tasks: Vec<String>,
}

impl WatchRule {
    pub fn new<I, S>(patterns: I, tasks: Vec<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns, tasks })
    }

    fn matches(&self, relative: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(relative))
    }
}

/// Watches a project root and turns matching file events into task runs.
#[derive(Debug, Clone)]
pub struct WatchTrigger {
    root: PathBuf,
    rules: Vec<WatchRule>,
}

impl WatchTrigger {
    pub fn new(root: impl Into<PathBuf>, rules: Vec<WatchRule>) -> Self {
        Self {
            root: root.into(),
            rules,
        }
    }

    pub fn from_config(root: impl Into<PathBuf>, watch: &[WatchConfig]) -> Result<Self> {
        let rules = watch
            .iter()
            .map(|w| WatchRule::new(&w.paths, w.tasks.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(root, rules))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rules(&self) -> &[WatchRule] {
        &self.rules
    }

    /// Task names triggered by a change at `path`, in rule order, each
    /// listed once.
    pub fn matching_tasks(&self, path: &Path) -> Vec<String> {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let relative = normalize(relative);

        let mut tasks: Vec<String> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.matches(&relative)) {
            for task in &rule.tasks {
                if !tasks.contains(task) {
                    tasks.push(task.clone());
                }
            }
        }
        tasks
    }

    /// Directories to register with the watcher: the literal prefix of
    /// every pattern, below the root.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = Vec::new();
        for pattern in self.rules.iter().flat_map(|r| &r.patterns) {
            let prefix: PathBuf = Path::new(pattern.as_str())
                .components()
                .take_while(|c| !is_glob(&c.as_os_str().to_string_lossy()))
                .collect();
            let dir = self.root.join(prefix);
            if !roots.iter().any(|r| dir.starts_with(r)) {
                roots.retain(|r| !r.starts_with(&dir));
                roots.push(dir);
            }
        }
        roots
    }

    /// Start a watcher that forwards changed paths to `tx`.
    ///
    /// The watcher must be kept alive for watching to continue.
    pub fn start(&self, tx: mpsc::UnboundedSender<PathBuf>) -> Result<RecommendedWatcher> {
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
                Err(e) => wlog_warn!("Watch error: {}", e),
            },
            NotifyConfig::default(),
        )?;

        for dir in self.watch_roots() {
            // A directory the pattern points at may not exist yet.
            let dir = nearest_existing(&dir);
            wlog_debug!("Watching {}", dir.display());
            watcher.watch(&dir, RecursiveMode::Recursive)?;
        }
        Ok(watcher)
    }

    /// Run every task triggered by `path`, one after another.
    pub async fn dispatch(
        &self,
        orchestrator: &Orchestrator,
        path: &Path,
    ) -> Vec<(String, Result<RunResult>)> {
        let mut runs = Vec::new();
        for task in self.matching_tasks(path) {
            wlog!("{} changed, running {}", path.display(), task);
            let result = orchestrator.invoke(&task).await;
            if let Err(e) = &result {
                wlog_error!("Watch run of {} aborted: {}", task, e);
            }
            runs.push((task, result));
        }
        runs
    }

    /// Watch until `cancel` fires.
    pub async fn run(self, orchestrator: Arc<Orchestrator>, cancel: CancellationToken) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = self.start(tx)?;
        wlog!("Watching {} rule(s) under {}", self.rules.len(), self.root.display());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    wlog!("Watch cancelled");
                    break;
                }
                changed = rx.recv() => match changed {
                    Some(path) => {
                        self.dispatch(&orchestrator, &path).await;
                    }
                    None => break,
                },
            }
        }
        Ok(())
    }
}

fn is_glob(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

/// Forward-slash path without a leading `./`, as patterns are written.
fn normalize(path: &Path) -> String {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn nearest_existing(dir: &Path) -> PathBuf {
    let mut current = dir;
    while !current.exists() {
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current.to_path_buf()
}
