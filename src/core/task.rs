//! Task definitions and per-run task instances.
//!
//! A [`Task`] is immutable once registered. Each run creates fresh
//! [`TaskInstance`]s that walk the `Pending -> Running -> terminal` lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::operation::Operation;
use crate::error::{Error, Result};

/// A named unit of build work with a body and declared prerequisites.
#[derive(Debug, Clone)]
pub struct Task {
    /// Public task name, unique within a registry.
    pub name: String,
    /// Opaque body.
    pub body: Operation,
    /// Names of tasks that must succeed before this one starts.
    pub dependencies: Vec<String>,
    /// Title used for failure notifications.
    pub error_title: Option<String>,
}

impl Task {
    /// Create a task with no dependencies.
    pub fn new(name: impl Into<String>, body: Operation) -> Self {
        Self {
            name: name.into(),
            body,
            dependencies: Vec::new(),
            error_title: None,
        }
    }

    /// Create a body-less task that only aggregates its dependencies.
    pub fn aggregate<I, S>(name: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, Operation::noop()).with_dependencies(dependencies)
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_error_title(mut self, title: impl Into<String>) -> Self {
        self.error_title = Some(title.into());
        self
    }

    /// Notification title for failures of this task.
    pub fn error_title(&self) -> String {
        self.error_title
            .clone()
            .unwrap_or_else(|| format!("{} failed", self.name))
    }
}

/// Lifecycle state of a task instance within one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Not started yet.
    Pending,
    /// Body is executing.
    Running,
    /// Body reported success.
    Succeeded,
    /// Body reported failure.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed { .. } => "failed",
        }
    }
}

/// One execution of a task inside a single run.
///
/// Transitions are strictly `Pending -> Running -> {Succeeded | Failed}`.
/// There are no retries: terminal states reject further transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub name: String,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskInstance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    /// Transition `Pending -> Running`.
    pub fn start(&mut self) -> Result<()> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Transition `Running -> Succeeded`.
    pub fn succeed(&mut self) -> Result<()> {
        self.transition(TaskStatus::Succeeded)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Transition `Running -> Failed`.
    pub fn fail(&mut self, error: &str) -> Result<()> {
        self.transition(TaskStatus::Failed {
            error: error.to_string(),
        })?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall time between start and finish, when both are known.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        let allowed = matches!(
            (&self.status, &next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Succeeded)
                | (TaskStatus::Running, TaskStatus::Failed { .. })
        );
        if !allowed {
            return Err(Error::InvalidTransition {
                task: self.name.clone(),
                from: self.status.label().to_string(),
                to: next.label().to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}
