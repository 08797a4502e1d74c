//! Log forwarding for container stdout/stderr
//!
//! Each line read from a runner's output is re-emitted as a tracing event
//! tagged with the runner label and instance id.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use uuid::Uuid;

/// Stream type identifier for logging
#[derive(Debug, Clone, Copy)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Detect the level of a line written by a server process.
///
/// Recognizes the redis log layout, where the fifth whitespace separated field
/// after the `pid:role` prefix is a level marker:
/// ```text
/// 1:M 16 Oct 2026 10:00:00.123 * Ready to accept connections tcp
/// 1:S 16 Oct 2026 10:00:01.456 # Error condition on socket for SYNC
/// ```
/// and the tracing-subscriber plain layout (`<timestamp> LEVEL target: msg`).
///
/// Falls back to INFO.
fn detect_log_level(line: &str) -> Level {
    detect_redis_level(line)
        .or_else(|| detect_plain_level(line))
        .unwrap_or(Level::INFO)
}

fn detect_redis_level(line: &str) -> Option<Level> {
    let mut parts = line.split_whitespace();
    let prefix = parts.next()?;
    if !prefix.contains(':') {
        return None;
    }
    // day, month, year, time
    let marker = parts.nth(4)?;
    match marker {
        "#" => Some(Level::WARN),
        "*" | "-" => Some(Level::INFO),
        "." => Some(Level::DEBUG),
        _ => None,
    }
}

fn detect_plain_level(line: &str) -> Option<Level> {
    let mut parts = line.split_whitespace();
    let _timestamp = parts.next()?;
    match parts.next()? {
        "ERROR" | "error" => Some(Level::ERROR),
        "WARN" | "warn" => Some(Level::WARN),
        "INFO" | "info" => Some(Level::INFO),
        "DEBUG" | "debug" => Some(Level::DEBUG),
        "TRACE" | "trace" => Some(Level::TRACE),
        _ => None,
    }
}

fn forward_line(runner: &str, instance_id: Uuid, stream: StreamKind, line: &str) {
    match detect_log_level(line) {
        Level::ERROR => {
            tracing::error!(runner = %runner, instance_id = %instance_id, stream = %stream, "{line}");
        }
        Level::WARN => {
            tracing::warn!(runner = %runner, instance_id = %instance_id, stream = %stream, "{line}");
        }
        Level::INFO => {
            tracing::info!(runner = %runner, instance_id = %instance_id, stream = %stream, "{line}");
        }
        Level::DEBUG => {
            tracing::debug!(runner = %runner, instance_id = %instance_id, stream = %stream, "{line}");
        }
        Level::TRACE => {
            tracing::trace!(runner = %runner, instance_id = %instance_id, stream = %stream, "{line}");
        }
    }
}

/// Spawn a task that reads lines from a child stream and forwards them to tracing.
///
/// The task will run until either:
/// - The stream is closed (container exits)
/// - The cancellation token is triggered
pub fn spawn_stream_forwarder<S>(
    stream: S,
    runner: String,
    instance_id: Uuid,
    cancel: CancellationToken,
    kind: StreamKind,
) -> JoinHandle<()>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::debug!(runner = %runner, instance_id = %instance_id, stream = ?kind, "log forwarder cancelled");
                    break;
                }

                result = lines.next_line() => {
                    match result {
                        Ok(Some(line)) => forward_line(&runner, instance_id, kind, &line),
                        Ok(None) => {
                            tracing::debug!(runner = %runner, instance_id = %instance_id, stream = ?kind, "log stream closed");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(
                                runner = %runner,
                                instance_id = %instance_id,
                                stream = ?kind,
                                error = %e,
                                "log stream read error"
                            );
                            break;
                        }
                    }
                }
            }
        }
    })
}
