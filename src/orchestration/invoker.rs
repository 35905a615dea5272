//! Top-level invocation surface.
//!
//! [`Orchestrator::invoke`] routes a name either to the sequencer (when it
//! names a composite such as `default` or `full`) or to the dependency
//! scheduler (any plain task).

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::dag::ExecutionPlan;
use crate::error::Result;
use crate::orchestration::interceptor::ErrorInterceptor;
use crate::orchestration::result::{RunEvent, RunResult};
use crate::orchestration::runner::TaskRunner;
use crate::orchestration::scheduler::DependencyScheduler;
use crate::orchestration::sequencer::Sequencer;
use crate::registry::TaskRegistry;
use crate::{wlog, wlog_error};

/// Owns the registry and both execution engines.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Arc<TaskRegistry>,
    runner: TaskRunner,
}

impl Orchestrator {
    pub fn new(registry: TaskRegistry) -> Self {
        Self::from_shared(Arc::new(registry))
    }

    pub fn from_shared(registry: Arc<TaskRegistry>) -> Self {
        Self {
            registry,
            runner: TaskRunner::new(),
        }
    }

    pub fn with_interceptor(mut self, interceptor: ErrorInterceptor) -> Self {
        self.runner = self.runner.with_interceptor(interceptor);
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.runner = self.runner.with_events(events);
        self
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> DependencyScheduler {
        DependencyScheduler::with_runner(Arc::clone(&self.registry), self.runner.clone())
    }

    pub fn sequencer(&self) -> Sequencer {
        Sequencer::with_runner(Arc::clone(&self.registry), self.runner.clone())
    }

    /// Graph plan for a plain task. Composites have no single plan.
    pub fn plan(&self, name: &str) -> Result<ExecutionPlan> {
        self.scheduler().plan(name)
    }

    /// Run a task or composite by name.
    pub async fn invoke(&self, name: &str) -> Result<RunResult> {
        wlog!("Invoking {}", name);
        let result = if self.registry.is_composite(name) {
            self.sequencer().run_composite(name).await
        } else {
            self.scheduler().run(name).await
        };

        match &result {
            Ok(run) if run.is_success() => wlog!("{} finished: {} task(s) succeeded", name, run.tasks.len()),
            Ok(run) => wlog_error!(
                "{} failed at {}: {}",
                name,
                run.failed_task().unwrap_or("<unknown>"),
                run.outcome
            ),
            Err(e) => wlog_error!("{} aborted: {}", name, e),
        }
        result
    }

    /// Same as [`invoke`](Self::invoke), delivering the result to
    /// `on_complete` exactly once.
    pub async fn invoke_with_callback<F>(&self, name: &str, on_complete: F)
    where
        F: FnOnce(Result<RunResult>),
    {
        on_complete(self.invoke(name).await);
    }
}
