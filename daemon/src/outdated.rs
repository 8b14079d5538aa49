/// The "outdated packages" report, in streaming and blocking flavours.
///
/// An empty report means every dependency is current, which is spelled out as
/// `up-to-date` so the log never contains a bare header.
use crate::command::CommandEvent;
use crate::config::Config;
use crate::error::{Result, UpdaterError};
use crate::updater::Updater;

pub const OUTDATED_SUBCOMMAND: &str = "outdated";
pub const UP_TO_DATE: &str = "up-to-date";

impl Updater {
    fn outdated_header(&self, config: &Config) -> String {
        format!(
            "{}==== Executing command '{}' ====\r\n\r\n",
            self.banner(config),
            self.runner().describe(OUTDATED_SUBCOMMAND)
        )
    }

    fn outdated_footer(&self) -> String {
        format!(
            "\r\n==== '{}' completed ====\r\n",
            self.runner().describe(OUTDATED_SUBCOMMAND)
        )
    }

    /// Runs the outdated check to completion and returns the full report.
    ///
    /// Fails only if the package manager could not be started. Anything on
    /// stderr is logged for diagnostics and otherwise ignored.
    pub async fn outdated(&self, config: &Config) -> Result<String> {
        let stream = self
            .runner()
            .spawn(OUTDATED_SUBCOMMAND, &config.working_dir)?;
        let output = stream.collect().await;

        if let Some(cause) = output.failure {
            return Err(UpdaterError::CommandFailed {
                command: self.runner().describe(OUTDATED_SUBCOMMAND),
                cause,
            });
        }
        if !output.stderr.is_empty() {
            tracing::debug!(project = %self.project().name, "outdated stderr: {}", output.stderr);
        }

        let mut report = self.outdated_header(config);
        if output.stdout.is_empty() {
            report.push_str(UP_TO_DATE);
            report.push_str("\r\n");
        } else {
            report.push_str(&output.stdout);
        }
        report.push_str(&self.outdated_footer());
        Ok(report)
    }

    /// Runs the outdated check, handing each chunk to `on_chunk` as it arrives.
    ///
    /// `on_chunk(text, is_final)` is called with the header first, then once
    /// per trimmed stdout chunk, and exactly once with `is_final == true`
    /// carrying the footer (preceded by `up-to-date` if nothing was printed).
    /// A spawn failure is reported inline as `error => <cause>`.
    pub async fn outdated_streaming<F>(&self, config: &Config, mut on_chunk: F)
    where
        F: FnMut(&str, bool) + Send,
    {
        on_chunk(&self.outdated_header(config), false);

        let mut saw_output = false;
        match self
            .runner()
            .spawn(OUTDATED_SUBCOMMAND, &config.working_dir)
        {
            Ok(mut stream) => {
                while let Some(event) = stream.next().await {
                    match event {
                        CommandEvent::Stdout(chunk) => {
                            let mut text = chunk.trim().to_string();
                            if !text.is_empty() {
                                text.push_str("\r\n");
                                saw_output = true;
                            }
                            on_chunk(&text, false);
                        }
                        CommandEvent::Stderr(chunk) => {
                            tracing::debug!(project = %self.project().name, "outdated stderr: {chunk}");
                        }
                        CommandEvent::Failed(cause) => {
                            on_chunk(&format!("error => {cause}\r\n"), false);
                        }
                        CommandEvent::Exited(_) => break,
                    }
                }
            }
            Err(e) => on_chunk(&format!("error => {e}\r\n"), false),
        }

        let mut tail = String::new();
        if !saw_output {
            tail.push_str(UP_TO_DATE);
            tail.push_str("\r\n");
        }
        tail.push_str(&self.outdated_footer());
        on_chunk(&tail, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::{Script, ScriptedRunner};
    use crate::command::ExitInfo;
    use crate::updater::testing::*;
    use std::sync::Arc;

    const FOOTER: &str = "==== 'npm outdated' completed ====";

    async fn stream_chunks(updater: &Updater, config: &Config) -> Vec<(String, bool)> {
        let mut chunks = Vec::new();
        updater
            .outdated_streaming(config, |text, is_final| {
                chunks.push((text.to_string(), is_final));
            })
            .await;
        chunks
    }

    // ── blocking ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn blocking_empty_stdout_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().with("outdated", Script::stdout(&[])));
        let updater = updater_with(runner, "demo");

        let report = updater.outdated(&config_in(dir.path())).await.unwrap();
        assert!(report.starts_with("package 'demo' cwd: "));
        assert!(report.contains("==== Executing command 'npm outdated' ===="));
        assert!(report.contains(UP_TO_DATE));
        assert!(report.trim_end().ends_with(FOOTER));
    }

    #[tokio::test]
    async fn blocking_returns_full_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().with(
            "outdated",
            Script::stdout(&["Package  Current  Wanted\n", "lodash   4.17.0   4.17.21\n"]),
        ));
        let updater = updater_with(runner, "demo");

        let report = updater.outdated(&config_in(dir.path())).await.unwrap();
        assert!(report.contains("Package  Current  Wanted\nlodash   4.17.0   4.17.21\n"));
        assert!(!report.contains(UP_TO_DATE));
        assert!(report.trim_end().ends_with(FOOTER));
    }

    #[tokio::test]
    async fn blocking_ignores_stderr_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().with(
            "outdated",
            Script::Events(vec![
                CommandEvent::Stderr("npm WARN something".into()),
                CommandEvent::Exited(ExitInfo {
                    code: Some(1),
                    signal: None,
                }),
            ]),
        ));
        let updater = updater_with(runner, "demo");

        let report = updater.outdated(&config_in(dir.path())).await.unwrap();
        assert!(report.contains(UP_TO_DATE));
        assert!(!report.contains("npm WARN"));
    }

    #[tokio::test]
    async fn blocking_spawn_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            ScriptedRunner::new().with("outdated", Script::SpawnFails("npm not found".into())),
        );
        let updater = updater_with(runner, "demo");

        let err = updater.outdated(&config_in(dir.path())).await.unwrap_err();
        assert!(matches!(err, UpdaterError::Spawn { .. }));
    }

    #[tokio::test]
    async fn blocking_twice_without_changes_is_up_to_date_both_times() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let runner = Arc::new(ScriptedRunner::new().with("outdated", Script::stdout(&[])));
        let updater = updater_with(Arc::clone(&runner), "demo");

        let first = updater.outdated(&config).await.unwrap();
        let second = updater.outdated(&config).await.unwrap();
        assert!(first.contains(UP_TO_DATE));
        assert!(second.contains(UP_TO_DATE));
        assert_eq!(runner.calls(), vec!["outdated", "outdated"]);
    }

    // ── streaming ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn streaming_without_output_ends_with_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().with("outdated", Script::stdout(&["  \n"])));
        let updater = updater_with(runner, "demo");

        let chunks = stream_chunks(&updater, &config_in(dir.path())).await;

        assert!(chunks[0].0.contains("Executing command 'npm outdated'"));
        assert!(!chunks[0].1);
        let finals: Vec<_> = chunks.iter().filter(|(_, f)| *f).collect();
        assert_eq!(finals.len(), 1);
        let (last, is_final) = chunks.last().unwrap();
        assert!(is_final);
        assert!(last.starts_with(UP_TO_DATE));
        assert!(last.trim_end().ends_with(FOOTER));
    }

    #[tokio::test]
    async fn streaming_with_output_omits_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().with(
            "outdated",
            Script::stdout(&["  lodash 4.17.0 4.17.21  \n", ""]),
        ));
        let updater = updater_with(runner, "demo");

        let chunks = stream_chunks(&updater, &config_in(dir.path())).await;

        assert_eq!(chunks[1], ("lodash 4.17.0 4.17.21\r\n".to_string(), false));
        let (last, is_final) = chunks.last().unwrap();
        assert!(is_final);
        assert!(!last.contains(UP_TO_DATE));
        assert!(last.trim_end().ends_with(FOOTER));
        assert_eq!(chunks.iter().filter(|(_, f)| *f).count(), 1);
    }

    #[tokio::test]
    async fn streaming_spawn_failure_is_inline_and_still_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            ScriptedRunner::new().with("outdated", Script::SpawnFails("npm not found".into())),
        );
        let updater = updater_with(runner, "demo");

        let chunks = stream_chunks(&updater, &config_in(dir.path())).await;

        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].0.starts_with("error => "));
        assert!(chunks[1].0.contains("npm not found"));
        assert!(!chunks[1].1);
        assert!(chunks[2].1);
        assert!(chunks[2].0.contains(UP_TO_DATE));
    }

    #[tokio::test]
    async fn streaming_wait_failure_is_inline_and_still_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().with(
            "outdated",
            Script::Events(vec![
                CommandEvent::Stdout("lodash 4.17.0 4.17.21\n".into()),
                CommandEvent::Failed("wait interrupted".into()),
            ]),
        ));
        let updater = updater_with(runner, "demo");

        let chunks = stream_chunks(&updater, &config_in(dir.path())).await;

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[1], ("lodash 4.17.0 4.17.21\r\n".to_string(), false));
        assert_eq!(chunks[2], ("error => wait interrupted\r\n".to_string(), false));
        let (last, is_final) = &chunks[3];
        assert!(is_final);
        assert!(!last.contains(UP_TO_DATE));
        assert!(last.trim_end().ends_with(FOOTER));
    }
}
