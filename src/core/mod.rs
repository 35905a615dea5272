//! Core domain models for build orchestration.
//!
//! This module contains tasks and their opaque bodies, the explicit
//! sequence model, and the dependency graph used for staged execution.

pub mod dag;
pub mod operation;
pub mod sequence;
pub mod task;

pub use dag::{ExecutionPlan, TaskGraph};
pub use operation::{BodyResult, Completion, Operation, OperationKind, StreamEvent, TaskError};
pub use sequence::{SequenceSpec, Step};
pub use task::{Task, TaskInstance, TaskStatus};
