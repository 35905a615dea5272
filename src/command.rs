//! Shell-command task bodies.
//!
//! A command body is a stream-completed [`Operation`]: every stdout line is
//! reported as progress, and the process exit status becomes the terminal
//! event. On failure the tail of stderr is carried in the error message so
//! the interceptor can show it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::core::operation::{BodyResult, Operation, StreamEvent, TaskError};
use crate::{wlog_debug, wlog_trace, wlog_warn};

/// Number of stderr lines kept in a failure message.
const STDERR_TAIL: usize = 20;

/// Body that runs `command` through the platform shell in the current
/// directory.
pub fn shell(command: impl Into<String>) -> Operation {
    build(command.into(), None)
}

/// Body that runs `command` through the platform shell inside `dir`.
pub fn shell_in(command: impl Into<String>, dir: impl Into<PathBuf>) -> Operation {
    build(command.into(), Some(dir.into()))
}

fn build(command: String, dir: Option<PathBuf>) -> Operation {
    let command: Arc<str> = command.into();
    Operation::stream(move || spawn(Arc::clone(&command), dir.clone()))
}

fn spawn(command: Arc<str>, dir: Option<PathBuf>) -> UnboundedReceiver<StreamEvent> {
    let (tx, rx) = mpsc::unbounded();
    tokio::spawn(async move {
        let terminal = match run(&command, dir.as_deref(), &tx).await {
            Ok(()) => StreamEvent::Finished,
            Err(e) => StreamEvent::Failed(e),
        };
        let _ = tx.unbounded_send(terminal);
    });
    rx
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

async fn run(command: &str, dir: Option<&Path>, tx: &UnboundedSender<StreamEvent>) -> BodyResult {
    wlog_debug!("shell: {} (cwd={:?})", command, dir);
    let mut cmd = shell_command(command);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| TaskError::new(format!("failed to spawn `{}`: {}", command, e)))?;

    let stderr = child.stderr.take();
    let stderr_lines = tokio::spawn(async move {
        let mut lines = Vec::new();
        if let Some(stderr) = stderr {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while let Ok(Some(line)) = next_line(&mut reader, &mut buf).await {
                lines.push(line);
            }
        }
        lines
    });

    if let Some(stdout) = child.stdout.take() {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            match next_line(&mut reader, &mut buf).await {
                Ok(Some(line)) => {
                    wlog_trace!("shell stdout: {}", line);
                    let _ = tx.unbounded_send(StreamEvent::Progress(line));
                }
                Ok(None) => break,
                Err(e) => {
                    wlog_warn!("shell: stopped reading stdout of `{}`: {}", command, e);
                    break;
                }
            }
        }
    }

    let status = child.wait().await?;
    let stderr = stderr_lines.await.unwrap_or_default();

    if status.success() {
        return Ok(());
    }

    let tail = &stderr[stderr.len().saturating_sub(STDERR_TAIL)..];
    let mut message = format!("`{}` exited with {}", command, status);
    if !tail.is_empty() {
        message.push('\n');
        message.push_str(&tail.join("\n"));
    }
    Err(TaskError::new(message))
}

/// Next line without its terminator. Bytes that are not UTF-8 are replaced.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.ends_with(b"\n") {
        buf.pop();
        if buf.ends_with(b"\r") {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}
