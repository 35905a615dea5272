//! Orchestration layer: executing tasks by graph or by explicit sequence.
//!
//! The [`DependencyScheduler`] derives stages from declared dependencies,
//! the [`Sequencer`] follows author-supplied step lists, and the
//! [`ErrorInterceptor`] turns body failures into notifications without
//! swallowing them. [`Orchestrator`] is the single entry point that routes
//! a name to the right engine.

mod interceptor;
mod invoker;
mod result;
mod runner;
mod scheduler;
mod sequencer;

pub use interceptor::{
    strip_ansi, ChannelSink, DesktopSink, ErrorInterceptor, LogSink, Notification,
    NotificationSink, NullSink,
};
pub use invoker::Orchestrator;
pub use result::{Outcome, RunEvent, RunResult};
pub use runner::TaskRunner;
pub use scheduler::DependencyScheduler;
pub use sequencer::Sequencer;
