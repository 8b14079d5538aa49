//! Background npm updater.
//!
//! Periodically runs `npm outdated` and `npm update` against one project,
//! appends the transcripts to monthly log files, and tells the host through
//! [`EventNotifier`] when an update changed dependencies and a restart is due.

pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod log_store;
pub mod manifest;
mod outdated;
pub mod paths;
pub mod scheduler;
mod update;
pub mod updater;

pub use command::{CommandRunner, ShellCommandRunner};
pub use config::{Config, ConfigOverrides, ConfigSource, FileConfigSource};
pub use error::{Result, UpdaterError};
pub use event::{Channel, EventNotifier, UpdaterEvent};
pub use manifest::ProjectIdentity;
pub use outdated::UP_TO_DATE;
pub use scheduler::{ChunkSink, Scheduler, SchedulerHandle, SchedulerState};
pub use update::{ChangeDetector, UpdateOutcome, REBOOT_REQUIRED};
pub use updater::Updater;
