use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use npm_updater::{
    paths, ConfigOverrides, ConfigSource, EventNotifier, FileConfigSource, Scheduler,
    ShellCommandRunner, Updater,
};

#[derive(Parser)]
#[command(name = "npm-updater")]
#[command(version, about = "Keeps a Node.js project's dependencies up to date in the background")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: ./npm-updater.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project directory, overrides `working_dir` from the config file
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Seconds between checks, overrides `update_interval_secs`
    #[arg(long, global = true)]
    interval: Option<u64>,

    /// Only report outdated packages, never run the update
    #[arg(long, global = true)]
    no_autoupdate: bool,

    /// Diagnostic output and "next check" markers in the log
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted (default)
    Run,
    /// Print the outdated report once and exit
    Outdated,
    /// Run one update now and exit
    Update,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "npm_updater=debug"
    } else {
        "npm_updater=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let overrides = ConfigOverrides {
        working_dir: cli.cwd.clone(),
        update_interval_secs: cli.interval,
        verbose: cli.verbose.then_some(true),
        autoupdate: cli.no_autoupdate.then_some(false),
    };
    let source = FileConfigSource::new(
        cli.config.clone().unwrap_or_else(paths::config_file_path),
        overrides,
    );
    let config = source.load()?;
    tracing::debug!(
        config = %source.path().display(),
        cwd = %config.working_dir.display(),
        "configuration loaded"
    );

    // ── Events ────────────────────────────────────────────────────────────────
    let notifier = Arc::new(EventNotifier::new());
    notifier.on_log(|message| tracing::debug!("log: {}", message.trim()));
    notifier.on_update(|project| tracing::info!("updating '{project}'"));
    notifier.on_updated(|project, did_change, _| {
        if did_change {
            tracing::info!("'{project}' dependencies changed; restart required");
        } else {
            tracing::info!("'{project}' already up to date");
        }
    });
    notifier.on_error(|cause, project| match project {
        Some(project) => tracing::error!("'{project}': {cause}"),
        None => tracing::error!("{cause}"),
    });

    let runner = Arc::new(ShellCommandRunner::new(config.package_manager.clone()));
    let updater = Arc::new(Updater::for_working_dir(runner, notifier, &config));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Outdated => {
            updater
                .outdated_streaming(&config, |chunk, _| print_chunk(chunk))
                .await;
        }
        Commands::Update => {
            let mut scheduler = Scheduler::new(Arc::clone(&updater), Box::new(source), config);
            let mut print = |chunk: &str| print_chunk(chunk);
            scheduler.update(false, "", Some(&mut print)).await;
        }
        Commands::Run => {
            tracing::info!(
                "npm-updater v{} watching '{}' every {}s",
                env!("CARGO_PKG_VERSION"),
                updater.project().name,
                config.effective_interval().as_secs()
            );
            let scheduler = Scheduler::new(Arc::clone(&updater), Box::new(source), config);
            tokio::select! {
                _ = scheduler.run() => {}
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        tracing::error!("failed to listen for Ctrl+C: {e}");
                    }
                    tracing::info!("Shutting down");
                }
            }
        }
    }

    Ok(())
}

fn print_chunk(chunk: &str) {
    if let Err(e) = write_chunk(&mut std::io::stdout().lock(), chunk) {
        // Usually a closed pipe (`npm-updater outdated | head`); the run goes on.
        tracing::debug!("stdout write failed: {e}");
    }
}

fn write_chunk(out: &mut impl Write, chunk: &str) -> std::io::Result<()> {
    out.write_all(chunk.as_bytes())?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_chunk_passes_text_through() {
        let mut out = Vec::new();
        write_chunk(&mut out, "added 1 package\n").unwrap();
        assert_eq!(out, b"added 1 package\n");
    }

    #[test]
    fn write_chunk_surfaces_a_closed_pipe() {
        let err = write_chunk(&mut ClosedPipe, "chunk").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
}
