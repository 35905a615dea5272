//! Failure interception and user-facing notifications.
//!
//! [`ErrorInterceptor::wrap`] decorates a task body so that a failure is
//! reported as a `{title, message}` notification before it propagates. The
//! message has terminal color codes removed. The failure itself is passed on
//! unchanged, so scheduling and sequencing policies still see it.

use std::borrow::Cow;
use std::process::Command;
use std::sync::{Arc, LazyLock};

use futures::stream::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::operation::{catch_panic, guarded_events, Operation, StreamEvent, TaskError};
use crate::{wlog_error, wlog_warn};

/// Regex for SGR escape sequences such as `ESC[31m` or `ESC[1;32m`.
static ANSI_SGR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("static regex"));

/// Remove terminal color/formatting escape sequences from `text`.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_SGR_RE.replace_all(text, "")
}

/// A user-facing failure alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Fire-and-forget notification collaborator.
///
/// Implementations must not fail loudly: problems delivering a notification
/// never reach the run result.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Writes notifications to stderr and the log file.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notification: &Notification) {
        wlog_error!("{}: {}", notification.title, notification.message);
        eprintln!("[{}] {}", notification.title, notification.message);
    }
}

/// Discards notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notification: &Notification) {}
}

/// Forwards notifications over a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: &Notification) {
        let _ = self.tx.send(notification.clone());
    }
}

/// Raises a desktop alert through the platform's notifier command.
///
/// The command runs on a detached thread; its exit status is only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopSink;

impl DesktopSink {
    fn command(notification: &Notification) -> Command {
        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification {:?} with title {:?}",
                notification.message, notification.title
            );
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(script);
            cmd
        } else {
            let mut cmd = Command::new("notify-send");
            cmd.arg(&notification.title).arg(&notification.message);
            cmd
        }
    }
}

impl NotificationSink for DesktopSink {
    fn notify(&self, notification: &Notification) {
        wlog_error!("{}: {}", notification.title, notification.message);
        let mut cmd = Self::command(notification);
        std::thread::spawn(move || match cmd.status() {
            Ok(status) if status.success() => {}
            Ok(status) => wlog_warn!("Desktop notifier exited with {}", status),
            Err(e) => wlog_warn!("Desktop notifier unavailable: {}", e),
        });
    }
}

/// Decorates task bodies with failure reporting.
#[derive(Clone)]
pub struct ErrorInterceptor {
    sink: Arc<dyn NotificationSink>,
}

impl ErrorInterceptor {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Report `error` under `title` with escape codes removed.
    pub fn report(&self, title: &str, error: &TaskError) {
        let notification = Notification::new(title, strip_ansi(error.message()));
        self.sink.notify(&notification);
    }

    /// Return an operation that behaves like `operation`, reporting any
    /// failure before yielding it.
    ///
    /// Sync and stream bodies keep their variant; callback and future
    /// bodies are adapted to a future. A panicking body is reported like
    /// any other failure.
    pub fn wrap(&self, title: impl Into<String>, operation: Operation) -> Operation {
        let title: Arc<str> = Arc::from(title.into());
        let this = self.clone();

        match operation {
            Operation::Sync(f) => Operation::sync(move || {
                let result = catch_panic(|| f());
                if let Err(error) = &result {
                    this.report(&title, error);
                }
                result
            }),
            Operation::Stream(f) => Operation::stream(move || {
                let this = this.clone();
                let title = Arc::clone(&title);
                guarded_events(&*f).inspect(move |event| {
                    if let StreamEvent::Failed(error) = event {
                        this.report(&title, error);
                    }
                })
            }),
            other => Operation::future(move || {
                let inner = other.clone();
                let this = this.clone();
                let title = Arc::clone(&title);
                async move {
                    let result = inner.execute().await;
                    if let Err(error) = &result {
                        this.report(&title, error);
                    }
                    result
                }
            }),
        }
    }
}

impl std::fmt::Debug for ErrorInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorInterceptor").finish_non_exhaustive()
    }
}
