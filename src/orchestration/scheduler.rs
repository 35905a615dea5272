//! Dependency-graph scheduler.
//!
//! The scheduler plans a requested task's transitive closure into stages
//! and runs them in order. All members of a stage start together and the
//! stage ends when every member has reached a terminal outcome.
//!
//! Failure policy is "fail fast between stages, not within a stage": a
//! failing member never cancels its running siblings, but no later stage
//! begins.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;

use crate::core::dag::ExecutionPlan;
use crate::error::Result;
use crate::orchestration::interceptor::ErrorInterceptor;
use crate::orchestration::result::{Outcome, RunEvent, RunResult};
use crate::orchestration::runner::TaskRunner;
use crate::registry::TaskRegistry;
use crate::{wlog, wlog_debug};

/// Runs tasks in dependency order.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use wsk::{DependencyScheduler, Operation, TaskRegistry};
///
/// let mut registry = TaskRegistry::new();
/// registry.register("lint", Operation::noop(), Vec::<String>::new())?;
/// registry.register("build", Operation::noop(), ["lint"])?;
///
/// let scheduler = DependencyScheduler::new(Arc::new(registry));
/// let result = scheduler.run("build").await?;
/// assert!(result.is_success());
/// ```
#[derive(Debug, Clone)]
pub struct DependencyScheduler {
    registry: Arc<TaskRegistry>,
    runner: TaskRunner,
}

impl DependencyScheduler {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self::with_runner(registry, TaskRunner::new())
    }

    pub fn with_runner(registry: Arc<TaskRegistry>, runner: TaskRunner) -> Self {
        Self { registry, runner }
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

    /// Compute a fresh plan for `name`.
    pub fn plan(&self, name: &str) -> Result<ExecutionPlan> {
        self.registry.resolve(name)?;
        self.registry.graph()?.plan(name)
    }

    /// Run `name` and its transitive dependencies.
    ///
    /// Structural errors (unknown task or dependency, cycle) are returned as
    /// `Err` before any body runs. Execution failures produce an `Ok`
    /// result whose outcome is `Failed`.
    pub async fn run(&self, name: &str) -> Result<RunResult> {
        self.run_all(&[name]).await
    }

    /// Run the union of several tasks' closures as a single plan.
    pub async fn run_all<S: AsRef<str>>(&self, names: &[S]) -> Result<RunResult> {
        let result = self.run_nested(names).await?;
        self.runner.emit(RunEvent::RunFinished {
            outcome: result.outcome.clone(),
        });
        Ok(result)
    }

    /// Same as [`run`](Self::run), delivering the result to `on_complete`
    /// exactly once.
    pub async fn run_with_callback<F>(&self, name: &str, on_complete: F)
    where
        F: FnOnce(Result<RunResult>),
    {
        on_complete(self.run(name).await);
    }

    /// Plan and execute without publishing `RunFinished`, for use inside a
    /// larger run.
    pub(crate) async fn run_nested<S: AsRef<str>>(&self, names: &[S]) -> Result<RunResult> {
        for name in names {
            self.registry.resolve(name.as_ref())?;
        }
        let plan = self.registry.graph()?.plan_many(names)?;
        let roots: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
        wlog!(
            "Running {} ({} tasks in {} stages)",
            roots.join(", "),
            plan.task_count(),
            plan.len()
        );
        Ok(self.execute(&plan).await)
    }

    /// Execute a plan stage by stage.
    pub async fn execute(&self, plan: &ExecutionPlan) -> RunResult {
        let mut result = RunResult::new();

        for (index, stage) in plan.stages().iter().enumerate() {
            wlog_debug!("Stage {}: {}", index + 1, stage.join(", "));
            self.runner.emit(RunEvent::StageStarted {
                index,
                tasks: stage.clone(),
            });

            let outcomes = join_all(stage.iter().map(|name| self.run_member(name))).await;
            for (name, outcome) in stage.iter().zip(outcomes) {
                result.record(name.clone(), outcome);
            }

            if !result.is_success() {
                wlog!(
                    "Stage {} failed; skipping {} remaining stage(s)",
                    index + 1,
                    plan.len() - index - 1
                );
                break;
            }
        }

        result
    }

    async fn run_member(&self, name: &str) -> Outcome {
        match self.registry.resolve(name) {
            Ok(task) => self.runner.run_task(&task).await,
            // Plans only ever contain registered names.
            Err(e) => Outcome::failed(e.to_string()),
        }
    }
}
