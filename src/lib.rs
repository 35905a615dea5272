pub mod command;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod registry;
pub mod util;
pub mod watch;

pub use crate::core::{Operation, SequenceSpec, Step, Task, TaskError};
pub use error::{Error, Result};
pub use orchestration::{
    DependencyScheduler, ErrorInterceptor, Orchestrator, Outcome, RunEvent, RunResult, Sequencer,
};
pub use registry::{Composite, MethodEntry, MethodSet, NameMap, TaskRegistry};
