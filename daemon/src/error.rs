use std::path::PathBuf;
use thiserror::Error;

/// Failures that can occur inside an update cycle.
///
/// None of these ever escape the scheduling loop: the scheduler turns them
/// into `error` events and log lines, then arms the next timer regardless.
/// A non-zero exit code from the package manager is deliberately absent; it
/// is reported as completion text, not as an error.
#[derive(Error, Debug)]
pub enum UpdaterError {
    /// The project manifest could not be read, or the config source failed.
    #[error("Bad working directory: {0}")]
    Configuration(String),

    /// The package manager process could not be started at all.
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process started but its completion could not be observed.
    #[error("Command '{command}' failed: {cause}")]
    CommandFailed { command: String, cause: String },

    #[error("Failed to write log file {}: {source}", path.display())]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A request was sent to a scheduler loop that is no longer running.
    #[error("Scheduler is not running")]
    SchedulerStopped,
}

pub type Result<T> = std::result::Result<T, UpdaterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_names_command_and_cause() {
        let err = UpdaterError::Spawn {
            command: "npm update".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let msg = err.to_string();
        assert!(msg.contains("npm update"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn log_write_error_includes_path() {
        let err = UpdaterError::LogWrite {
            path: PathBuf::from("/tmp/log/2026-10.log"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("2026-10.log"));
    }
}
