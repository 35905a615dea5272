//! Explicit sequencer.
//!
//! Runs a [`SequenceSpec`] strictly in order. A single-task step runs that
//! task alone, without resolving its declared dependencies: the author's
//! ordering is trusted. A group step runs its members concurrently and
//! completes when all of them have. The first failed step halts the
//! sequence.
//!
//! A step may name a composite. The composite's prerequisites then run
//! through the [`DependencyScheduler`] and its own sequence is nested as
//! the step's body.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use tokio::sync::mpsc;

use crate::core::sequence::{SequenceSpec, Step};
use crate::error::{Error, Result};
use crate::orchestration::interceptor::ErrorInterceptor;
use crate::orchestration::result::{Outcome, RunEvent, RunResult};
use crate::orchestration::runner::TaskRunner;
use crate::orchestration::scheduler::DependencyScheduler;
use crate::registry::TaskRegistry;
use crate::{wlog, wlog_debug};

/// Executes explicit ordered task lists.
#[derive(Debug, Clone)]
pub struct Sequencer {
    registry: Arc<TaskRegistry>,
    runner: TaskRunner,
}

impl Sequencer {
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

    /// Run `spec` step by step.
    ///
    /// Every referenced name is checked before the first step starts;
    /// structural problems are returned as `Err` and nothing runs.
    pub async fn run(&self, spec: &SequenceSpec) -> Result<RunResult> {
        let graph = self.registry.graph()?;
        self.registry.check_sequence(&graph, spec)?;

        wlog!("Running sequence {}", spec);
        let mut result = RunResult::new();
        self.run_steps(spec, &mut result).await;
        self.finish(result)
    }

    /// Run a registered composite: prerequisites first, then its sequence.
    pub async fn run_composite(&self, name: &str) -> Result<RunResult> {
        let composite = self
            .registry
            .composite(name)
            .ok_or_else(|| Error::UnknownTask(name.to_string()))?;
        let graph = self.registry.graph()?;
        self.registry
            .check_sequence(&graph, &SequenceSpec::default().then(composite.name.clone()))?;

        let result = self.run_entry(name).await;
        self.finish(result)
    }

    /// Run `spec` and report through `on_complete`: `None` on success,
    /// otherwise the error that stopped the sequence.
    pub async fn run_with_callback<F>(&self, spec: &SequenceSpec, on_complete: F)
    where
        F: FnOnce(Option<Error>),
    {
        let error = match self.run(spec).await {
            Ok(result) => result.into_result().err(),
            Err(e) => Some(e),
        };
        on_complete(error);
    }

    fn finish(&self, result: RunResult) -> Result<RunResult> {
        self.runner.emit(RunEvent::RunFinished {
            outcome: result.outcome.clone(),
        });
        Ok(result)
    }

    /// Run steps into `result`, stopping at the first failure.
    fn run_steps<'a>(
        &'a self,
        spec: &'a SequenceSpec,
        result: &'a mut RunResult,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for (index, step) in spec.steps().iter().enumerate() {
                wlog_debug!("Step {}: {}", index + 1, step);
                self.runner.emit(RunEvent::StepStarted {
                    index,
                    tasks: step.names().to_vec(),
                });

                match step {
                    Step::Task(name) => result.merge(self.run_entry(name).await),
                    Step::Group(names) => {
                        let outcomes = join_all(names.iter().map(|n| self.run_entry(n))).await;
                        for outcome in outcomes {
                            result.merge(outcome);
                        }
                    }
                }

                if !result.is_success() {
                    wlog!(
                        "Step {} ({}) failed; halting sequence",
                        index + 1,
                        step
                    );
                    return;
                }
            }
        })
    }

    /// Run one referenced name: a plain task, or a nested composite.
    fn run_entry<'a>(&'a self, name: &'a str) -> BoxFuture<'a, RunResult> {
        Box::pin(async move {
            let mut result = RunResult::new();

            let Some(composite) = self.registry.composite(name) else {
                let outcome = match self.registry.resolve(name) {
                    Ok(task) => self.runner.run_task(&task).await,
                    Err(e) => Outcome::failed(e.to_string()),
                };
                result.record(name, outcome);
                return result;
            };

            wlog!("Running composite {}", name);
            if !composite.prerequisites.is_empty() {
                let scheduler =
                    DependencyScheduler::with_runner(Arc::clone(&self.registry), self.runner.clone());
                match scheduler.run_nested(composite.prerequisites.as_slice()).await {
                    Ok(prerequisites) => result.merge(prerequisites),
                    Err(e) => result.record(name, Outcome::failed(e.to_string())),
                }
            }

            if result.is_success() {
                self.run_steps(&composite.sequence, &mut result).await;
            }

            let outcome = result.outcome.clone();
            result.record(name, outcome);
            result
        })
    }
}
