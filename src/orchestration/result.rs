//! Run outcomes and lifecycle events.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Terminal outcome of a task or a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Outcome {
    Succeeded,
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

impl Outcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Outcome::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// Terminal record of one orchestration invocation.
///
/// `tasks` keeps insertion order: stage order for graph runs, step order
/// for sequences. Within a stage or group, members are recorded in their
/// declared (or sorted) order once all of them have finished, so the record
/// does not depend on completion interleaving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub outcome: Outcome,
    pub tasks: IndexMap<String, Outcome>,
}

impl Default for RunResult {
    fn default() -> Self {
        Self::new()
    }
}

impl RunResult {
    /// An empty, successful result.
    pub fn new() -> Self {
        Self {
            outcome: Outcome::Succeeded,
            tasks: IndexMap::new(),
        }
    }

    /// Record a task outcome. The first failure recorded becomes the run's
    /// outcome.
    pub fn record(&mut self, task: impl Into<String>, outcome: Outcome) {
        if self.outcome.is_success() {
            if let Outcome::Failed { error } = &outcome {
                self.outcome = Outcome::failed(error.clone());
            }
        }
        self.tasks.insert(task.into(), outcome);
    }

    /// Fold another result in, keeping its record order.
    pub fn merge(&mut self, other: RunResult) {
        if self.outcome.is_success() && other.outcome.is_failure() {
            self.outcome = other.outcome.clone();
        }
        for (task, outcome) in other.tasks {
            self.tasks.insert(task, outcome);
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn outcome_of(&self, task: &str) -> Option<&Outcome> {
        self.tasks.get(task)
    }

    /// First task recorded as failed.
    pub fn failed_task(&self) -> Option<&str> {
        self.tasks
            .iter()
            .find(|(_, outcome)| outcome.is_failure())
            .map(|(task, _)| task.as_str())
    }

    /// Task names in record order.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }

    /// Convert a failed run into [`Error::TaskExecutionFailed`].
    pub fn into_result(self) -> Result<RunResult> {
        match &self.outcome {
            Outcome::Succeeded => Ok(self),
            Outcome::Failed { error } => Err(Error::TaskExecutionFailed {
                task: self.failed_task().unwrap_or("<unknown>").to_string(),
                cause: error.clone(),
            }),
        }
    }
}

/// Events published while a run progresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// A graph stage is about to start all of its members.
    StageStarted { index: usize, tasks: Vec<String> },
    /// A sequence step is about to start.
    StepStarted { index: usize, tasks: Vec<String> },
    TaskStarted { task: String },
    TaskProgress { task: String, message: String },
    TaskSucceeded { task: String },
    TaskFailed { task: String, error: String },
    /// The top-level run has produced its result.
    RunFinished { outcome: Outcome },
}
