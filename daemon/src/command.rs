/// Package-manager subprocesses with incremental output.
///
/// Each call spawns `<tool> <subcommand>` through the platform shell and hands
/// back a [`CommandStream`]. A pump task owns the child, forwards stdout and
/// stderr chunks as soon as they are read, and finishes with a single
/// [`CommandEvent::Exited`]. Dropping the stream kills the child.
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::{Result, UpdaterError};

const READ_BUFFER_BYTES: usize = 8 * 1024;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Exit details. Informational only; a non-zero code is not a failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    /// Terminating signal, on platforms that have them.
    pub signal: Option<i32>,
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    Stdout(String),
    Stderr(String),
    /// The child was spawned but could not be waited on.
    Failed(String),
    Exited(ExitInfo),
}

/// Everything a finished command wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit: Option<ExitInfo>,
    pub failure: Option<String>,
}

/// Single-pass sequence of events from one command invocation.
#[derive(Debug)]
pub struct CommandStream {
    events: mpsc::Receiver<CommandEvent>,
}

impl CommandStream {
    pub fn new(events: mpsc::Receiver<CommandEvent>) -> Self {
        Self { events }
    }

    /// Builds a stream that replays `events`, then ends.
    pub fn from_events(events: Vec<CommandEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            // Capacity matches the event count, so this never fails.
            let _ = tx.try_send(event);
        }
        Self::new(rx)
    }

    /// Waits for the next chunk. `None` once the command is done.
    pub async fn next(&mut self) -> Option<CommandEvent> {
        self.events.recv().await
    }

    /// Drains the stream to completion.
    pub async fn collect(mut self) -> CapturedOutput {
        let mut out = CapturedOutput::default();
        while let Some(event) = self.next().await {
            match event {
                CommandEvent::Stdout(chunk) => out.stdout.push_str(&chunk),
                CommandEvent::Stderr(chunk) => out.stderr.push_str(&chunk),
                CommandEvent::Failed(cause) => out.failure = Some(cause),
                CommandEvent::Exited(info) => out.exit = Some(info),
            }
        }
        out
    }
}

/// Starts package-manager subcommands.
pub trait CommandRunner: Send + Sync {
    /// Human-readable command line, e.g. `npm update`.
    fn describe(&self, subcommand: &str) -> String;

    /// Spawns `subcommand` in `working_dir`.
    ///
    /// Returns [`UpdaterError::Spawn`] if the process could not be started.
    fn spawn(&self, subcommand: &str, working_dir: &Path) -> Result<CommandStream>;
}

/// Runs `<tool> <subcommand>` through `sh -c` (or `cmd /C` on Windows).
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    tool: String,
}

impl ShellCommandRunner {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    fn shell_command(command_line: &str) -> Command {
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command_line);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command_line);
            cmd
        }
    }
}

impl CommandRunner for ShellCommandRunner {
    fn describe(&self, subcommand: &str) -> String {
        format!("{} {subcommand}", self.tool)
    }

    fn spawn(&self, subcommand: &str, working_dir: &Path) -> Result<CommandStream> {
        let command_line = self.describe(subcommand);
        tracing::debug!(command = %command_line, cwd = %working_dir.display(), "spawning");

        let mut child = Self::shell_command(&command_line)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| UpdaterError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let pumps = async {
                let (out_alive, err_alive) = tokio::join!(
                    pump(stdout, tx.clone(), CommandEvent::Stdout),
                    pump(stderr, tx.clone(), CommandEvent::Stderr),
                );
                out_alive && err_alive
            };
            // A silent child never trips a failed send, so watch the receiver too.
            let listening = tokio::select! {
                alive = pumps => alive,
                _ = tx.closed() => false,
            };
            let status = if listening {
                tokio::select! {
                    status = child.wait() => Some(status),
                    _ = tx.closed() => None,
                }
            } else {
                None
            };

            match status {
                Some(Ok(status)) => {
                    let _ = tx.send(CommandEvent::Exited(status.into())).await;
                }
                Some(Err(e)) => {
                    let _ = tx.send(CommandEvent::Failed(e.to_string())).await;
                }
                None => {
                    tracing::debug!(command = %command_line, "stream dropped, killing child");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        });

        Ok(CommandStream::new(rx))
    }
}

/// Forwards everything read from `reader` as text chunks.
/// Returns `false` if the receiving side went away.
async fn pump<R>(
    reader: Option<R>,
    tx: mpsc::Sender<CommandEvent>,
    wrap: fn(String) -> CommandEvent,
) -> bool
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return true;
    };
    let mut buf = vec![0u8; READ_BUFFER_BYTES];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return true,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(wrap(chunk)).await.is_err() {
                    return false;
                }
            }
            Err(e) => {
                tracing::debug!("output pipe closed with error: {e}");
                return true;
            }
        }
    }
}
