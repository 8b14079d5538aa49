/// The `update` run: stream the package manager's output, keep a transcript,
/// and decide whether anything actually changed.
use std::time::Duration;

use crate::command::CommandEvent;
use crate::config::Config;
use crate::event::UpdaterEvent;
use crate::updater::Updater;

pub const UPDATE_SUBCOMMAND: &str = "update";
/// Gives the log append time to land before `updated` goes out.
pub const UPDATED_EVENT_DELAY: Duration = Duration::from_secs(1);
pub const REBOOT_REQUIRED: &str = "==== app reboot is required ====\r\n";

/// Words npm prints when it touched `node_modules` ("added 3 packages", ...).
const CHANGE_KEYWORDS: [&str; 3] = ["added", "removed", "changed"];

/// Sticky keyword scan over an output stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChangeDetector {
    changed: bool,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk. Once a change is seen it stays seen.
    pub fn observe(&mut self, chunk: &str) -> bool {
        if !self.changed {
            let normalized = chunk.trim().to_lowercase();
            self.changed = CHANGE_KEYWORDS.iter().any(|k| normalized.contains(k));
        }
        self.changed
    }

    pub fn changed(&self) -> bool {
        self.changed
    }
}

/// Result of one real `update` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub did_change: bool,
    pub transcript: String,
}

impl Updater {
    /// Runs `update` and returns its outcome, without the delayed `updated`
    /// event (see [`Updater::announce_updated`]).
    ///
    /// With `deferred_only` nothing is executed: in verbose mode `announce` is
    /// written to the log, otherwise the call does nothing. Real runs are
    /// serialized; a second caller waits for the first to finish.
    pub(crate) async fn run_update(
        &self,
        config: &Config,
        deferred_only: bool,
        announce: &str,
        mut on_chunk: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> Option<UpdateOutcome> {
        if deferred_only {
            if config.verbose {
                self.log(config, announce);
            }
            return None;
        }

        let _running = self.lock_run().await;
        let command = self.runner().describe(UPDATE_SUBCOMMAND);
        let mut transcript = format!(
            "{}==== Executing command '{command}' ====\r\n",
            self.banner(config)
        );
        if let Some(cb) = on_chunk.as_deref_mut() {
            cb(&transcript);
        }
        self.notifier().emit(UpdaterEvent::Update {
            project: self.project().name.clone(),
        });

        let mut detector = ChangeDetector::new();
        match self.runner().spawn(UPDATE_SUBCOMMAND, &config.working_dir) {
            Ok(mut stream) => {
                while let Some(event) = stream.next().await {
                    match event {
                        CommandEvent::Stdout(chunk) => {
                            if let Some(cb) = on_chunk.as_deref_mut() {
                                cb(&chunk);
                            }
                            transcript.push_str(&chunk);
                            detector.observe(&chunk);
                        }
                        CommandEvent::Stderr(chunk) => {
                            tracing::debug!(project = %self.project().name, "update stderr: {chunk}");
                        }
                        CommandEvent::Failed(cause) => {
                            self.report_update_error(cause, &mut transcript, &mut on_chunk);
                        }
                        CommandEvent::Exited(info) => {
                            tracing::debug!(?info, "{command} exited");
                            break;
                        }
                    }
                }
            }
            Err(e) => self.report_update_error(e.to_string(), &mut transcript, &mut on_chunk),
        }

        let mut footer = format!("\r\n==== '{command}' completed ====\r\n");
        if detector.changed() {
            footer.push_str(REBOOT_REQUIRED);
        }
        if let Some(cb) = on_chunk.as_deref_mut() {
            cb(&footer);
        }
        transcript.push_str(&footer);
        if config.verbose {
            transcript.push_str(announce);
        }
        self.log(config, &transcript);

        Some(UpdateOutcome {
            did_change: detector.changed(),
            transcript,
        })
    }

    /// Records a failure inline and as an `error` event. The run carries on.
    fn report_update_error(
        &self,
        cause: String,
        transcript: &mut String,
        on_chunk: &mut Option<&mut (dyn FnMut(&str) + Send)>,
    ) {
        let line = format!("error => {cause}\r\n");
        if let Some(cb) = on_chunk.as_deref_mut() {
            cb(&line);
        }
        transcript.push_str(&line);
        tracing::warn!(project = %self.project().name, "{cause}");
        self.emit_error(cause);
    }

    /// Waits for the log flush delay, then emits `updated` for `outcome`.
    pub(crate) async fn announce_updated(&self, outcome: &UpdateOutcome) {
        tokio::time::sleep(UPDATED_EVENT_DELAY).await;
        self.notifier().emit(UpdaterEvent::Updated {
            project: self.project().name.clone(),
            did_change: outcome.did_change,
            transcript: outcome.transcript.clone(),
        });
    }
}
