//! Execution of a single task instance.
//!
//! Both the dependency scheduler and the sequencer funnel every body
//! through [`TaskRunner::run_task`], which owns the instance lifecycle,
//! failure interception, logging and event publication.

use tokio::sync::mpsc;

use crate::core::task::{Task, TaskInstance};
use crate::orchestration::interceptor::ErrorInterceptor;
use crate::orchestration::result::{Outcome, RunEvent};
use crate::{wlog_debug, wlog_error, wlog_trace, wlog_warn};

/// Runs task bodies and reports on them.
#[derive(Debug, Clone, Default)]
pub struct TaskRunner {
    interceptor: Option<ErrorInterceptor>,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interceptor(mut self, interceptor: ErrorInterceptor) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Publish an event to the observer, if any.
    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Run one fresh instance of `task` to its terminal outcome.
    pub async fn run_task(&self, task: &Task) -> Outcome {
        let mut instance = TaskInstance::new(&task.name);
        self.transition(&task.name, instance.start());
        wlog_debug!("Task {} started ({} body)", task.name, task.body.kind());
        self.emit(RunEvent::TaskStarted {
            task: task.name.clone(),
        });

        let body = match &self.interceptor {
            Some(interceptor) => interceptor.wrap(task.error_title(), task.body.clone()),
            None => task.body.clone(),
        };

        let result = body
            .execute_observed(|message| {
                wlog_trace!("[{}] {}", task.name, message);
                self.emit(RunEvent::TaskProgress {
                    task: task.name.clone(),
                    message: message.to_string(),
                });
            })
            .await;

        match result {
            Ok(()) => {
                self.transition(&task.name, instance.succeed());
                wlog_debug!("Task {} succeeded in {:?}", task.name, instance.elapsed());
                self.emit(RunEvent::TaskSucceeded {
                    task: task.name.clone(),
                });
                Outcome::Succeeded
            }
            Err(error) => {
                self.transition(&task.name, instance.fail(error.message()));
                wlog_error!("Task {} failed: {}", task.name, error);
                self.emit(RunEvent::TaskFailed {
                    task: task.name.clone(),
                    error: error.message().to_string(),
                });
                Outcome::failed(error.message())
            }
        }
    }

    fn transition(&self, task: &str, result: crate::Result<()>) {
        // A fresh instance only ever moves forward, so this is a logic error.
        if let Err(e) = result {
            wlog_warn!("Task {}: {}", task, e);
        }
    }
}
