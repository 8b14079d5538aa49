use std::sync::Arc;

use crate::command::CommandRunner;
use crate::config::Config;
use crate::event::{EventNotifier, UpdaterEvent};
use crate::log_store::LogStore;
use crate::manifest::ProjectIdentity;

/// Shared handle for one project: runner, notifier and identity.
///
/// Hosts call `outdated` and `log` here directly. Updates go through the
/// scheduler ([`crate::Scheduler::update`] or [`crate::SchedulerHandle::update`])
/// so the timer is re-armed. Configuration is passed into every call rather
/// than stored, so a reload between cycles can never be observed half-applied.
pub struct Updater {
    runner: Arc<dyn CommandRunner>,
    notifier: Arc<EventNotifier>,
    project: ProjectIdentity,
    /// Held for the whole of a real `update` run.
    run_lock: tokio::sync::Mutex<()>,
}

impl Updater {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        notifier: Arc<EventNotifier>,
        project: ProjectIdentity,
    ) -> Self {
        Self {
            runner,
            notifier,
            project,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Resolves the project name from `config.working_dir`.
    ///
    /// An unreadable manifest is reported on the `error` channel and the
    /// updater carries on as [`ProjectIdentity::nameless`].
    pub fn for_working_dir(
        runner: Arc<dyn CommandRunner>,
        notifier: Arc<EventNotifier>,
        config: &Config,
    ) -> Self {
        let project = match ProjectIdentity::resolve(&config.working_dir) {
            Ok(project) => project,
            Err(e) => {
                tracing::error!("{e}");
                notifier.emit(UpdaterEvent::Error {
                    cause: e.to_string(),
                    project: None,
                });
                ProjectIdentity::nameless()
            }
        };
        Self::new(runner, notifier, project)
    }

    pub fn project(&self) -> &ProjectIdentity {
        &self.project
    }

    pub fn notifier(&self) -> &Arc<EventNotifier> {
        &self.notifier
    }

    pub(crate) fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Waits until no other update run is in flight.
    pub(crate) async fn lock_run(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.run_lock.lock().await
    }

    /// `package '<name>' cwd: <dir>` line that opens every transcript.
    pub(crate) fn banner(&self, config: &Config) -> String {
        format!(
            "package '{}' cwd: {}\r\n",
            self.project.name,
            config.working_dir.display()
        )
    }

    pub(crate) fn emit_error(&self, cause: impl Into<String>) {
        self.notifier.emit(UpdaterEvent::Error {
            cause: cause.into(),
            project: Some(self.project.name.clone()),
        });
    }

    /// Appends `message` to this month's log file and emits it as a `log` event.
    ///
    /// Write failures are reported through tracing and otherwise dropped; a
    /// broken log directory must never take the scheduler down.
    pub fn log(&self, config: &Config, message: &str) {
        let store = LogStore::new(config.resolved_log_dir());
        match store.append(message, true) {
            Ok(Some(block)) => self.notifier.emit(UpdaterEvent::Log(block)),
            Ok(None) => {}
            Err(e) => tracing::warn!("{e}"),
        }
    }
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}
