//! Opaque task bodies.
//!
//! An [`Operation`] is the executable part of a task. The orchestrator knows
//! nothing about what a body does; it only relies on every variant producing
//! exactly one terminal outcome, `Ok(())` for success or a [`TaskError`].

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use futures::Future;
use futures::Stream;
use tokio::sync::oneshot;

use crate::util::blocking;

/// Failure payload produced by a task body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Human-readable message as produced by the body, escape codes included.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Failure for a body that panicked with `payload`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => message.to_string(),
                Err(_) => "non-string payload".to_string(),
            },
        };
        Self::new(format!("task body panicked: {}", detail))
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TaskError {}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Terminal outcome of a single body execution.
pub type BodyResult = std::result::Result<(), TaskError>;

/// Events yielded by a stream-completed body.
///
/// Any number of `Progress` events may precede the terminal event. Anything
/// after the first terminal event is never polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Progress(String),
    Finished,
    Failed(TaskError),
}

/// One-shot completion handle given to callback-completed bodies.
///
/// Consuming `self` guarantees a single terminal signal. Dropping the handle
/// without signalling counts as a failure.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<BodyResult>,
}

impl Completion {
    fn new() -> (Self, oneshot::Receiver<BodyResult>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn succeed(self) {
        self.done(Ok(()));
    }

    pub fn fail(self, error: impl Into<TaskError>) {
        self.done(Err(error.into()));
    }

    pub fn done(self, result: BodyResult) {
        // The receiver is gone only if the run itself was dropped.
        let _ = self.tx.send(result);
    }
}

/// Run a synchronous body, turning a panic into a failure.
pub(crate) fn catch_panic<F>(f: F) -> BodyResult
where
    F: FnOnce() -> BodyResult,
{
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)))
}

/// Events of a stream body, with a panic while creating or polling the
/// stream delivered as a `Failed` event.
pub(crate) fn guarded_events(f: &StreamFn) -> BoxStream<'static, StreamEvent> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(events) => AssertUnwindSafe(events)
            .catch_unwind()
            .map(|event| {
                event.unwrap_or_else(|payload| StreamEvent::Failed(TaskError::from_panic(payload)))
            })
            .boxed(),
        Err(payload) => {
            stream::once(future::ready(StreamEvent::Failed(TaskError::from_panic(payload)))).boxed()
        }
    }
}

type SyncFn = dyn Fn() -> BodyResult + Send + Sync;
type CallbackFn = dyn Fn(Completion) + Send + Sync;
type StreamFn = dyn Fn() -> BoxStream<'static, StreamEvent> + Send + Sync;
type FutureFn = dyn Fn() -> BoxFuture<'static, BodyResult> + Send + Sync;

/// Polymorphic unit of work behind a task.
#[derive(Clone)]
pub enum Operation {
    /// Returns or fails immediately. Runs on the blocking pool.
    Sync(Arc<SyncFn>),
    /// Signals completion through a [`Completion`] handle.
    Callback(Arc<CallbackFn>),
    /// Emits progress events and a terminal event.
    Stream(Arc<StreamFn>),
    /// Resolves an async future.
    Future(Arc<FutureFn>),
}

/// Discriminant of an [`Operation`], for display and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Sync,
    Callback,
    Stream,
    Future,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Sync => write!(f, "sync"),
            OperationKind::Callback => write!(f, "callback"),
            OperationKind::Stream => write!(f, "stream"),
            OperationKind::Future => write!(f, "future"),
        }
    }
}

impl Operation {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn() -> BodyResult + Send + Sync + 'static,
    {
        Operation::Sync(Arc::new(f))
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(Completion) + Send + Sync + 'static,
    {
        Operation::Callback(Arc::new(f))
    }

    pub fn stream<F, S>(f: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = StreamEvent> + Send + 'static,
    {
        Operation::Stream(Arc::new(move || f().boxed()))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BodyResult> + Send + 'static,
    {
        Operation::Future(Arc::new(move || Box::pin(f())))
    }

    /// A body that succeeds immediately, for aggregate tasks that only
    /// exist to pull in their dependencies.
    pub fn noop() -> Self {
        Operation::future(|| async { BodyResult::Ok(()) })
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Sync(_) => OperationKind::Sync,
            Operation::Callback(_) => OperationKind::Callback,
            Operation::Stream(_) => OperationKind::Stream,
            Operation::Future(_) => OperationKind::Future,
        }
    }

    /// Run the body to its terminal outcome.
    pub async fn execute(&self) -> BodyResult {
        self.execute_observed(|_| {}).await
    }

    /// Run the body, passing stream progress messages to `on_progress`.
    ///
    /// A stream that ends without a terminal event is treated as finished.
    /// A panic in any variant is a failure of this body alone.
    pub async fn execute_observed<P>(&self, mut on_progress: P) -> BodyResult
    where
        P: FnMut(&str) + Send,
    {
        AssertUnwindSafe(self.drive(&mut on_progress))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)))
    }

    async fn drive<P>(&self, on_progress: &mut P) -> BodyResult
    where
        P: FnMut(&str) + Send,
    {
        match self {
            Operation::Sync(f) => {
                let f = Arc::clone(f);
                blocking(move || catch_panic(|| f()))
                    .await
                    .map_err(|e| TaskError::new(e.to_string()))?
            }
            Operation::Callback(f) => {
                let (completion, rx) = Completion::new();
                f(completion);
                rx.await.map_err(|_| {
                    TaskError::new("callback body dropped its completion without signalling")
                })?
            }
            Operation::Stream(f) => {
                let mut events = guarded_events(&**f);
                while let Some(event) = events.next().await {
                    match event {
                        StreamEvent::Progress(message) => on_progress(&message),
                        StreamEvent::Finished => return Ok(()),
                        StreamEvent::Failed(error) => return Err(error),
                    }
                }
                Ok(())
            }
            Operation::Future(f) => f().await,
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Operation").field(&self.kind()).finish()
    }
}
