/// The recurring update cycle.
///
/// ```text
/// start() ──► Armed ──timer──► run_cycle() ──► Armed ──timer──► ...
///               ▲                                 │
///               └──── update() (host request) ◄───┘
/// ```
///
/// `start` only logs a startup marker; it never runs the real update. Every
/// timer expiry reloads the config, logs a fresh outdated report, then either
/// updates (autoupdate on) or just records the next check (autoupdate off).
/// Host-requested updates run inside the same loop and re-arm the timer.
/// There is never more than one cycle in flight or more than one timer armed.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::config::{Config, ConfigSource};
use crate::error::{Result, UpdaterError};
use crate::event::UpdaterEvent;
use crate::log_store::format_timestamp;
use crate::update::UpdateOutcome;
use crate::updater::Updater;

pub const STARTUP_BANNER: &str = "\r\n==== 'npm-updater' startup ====";
const REQUEST_CHANNEL_CAPACITY: usize = 8;

/// Receives each chunk of a host-requested update as it is produced.
pub type ChunkSink = Box<dyn FnMut(&str) + Send>;

/// A pending wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub deadline: Instant,
    pub interval: Duration,
    /// Wall-clock time of `deadline`, as written to the log.
    pub next_check: DateTime<Local>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerState {
    /// `None` while idle or while a cycle is running.
    pub armed: Option<ArmedTimer>,
    pub last_cycle_was_deferred: bool,
}

enum SchedulerRequest {
    Update {
        deferred_only: bool,
        announce: String,
        on_chunk: Option<ChunkSink>,
        reply: oneshot::Sender<Option<UpdateOutcome>>,
    },
}

/// Cloneable way to reach a [`Scheduler`] after `run` has taken ownership.
#[derive(Clone)]
pub struct SchedulerHandle {
    requests: mpsc::Sender<SchedulerRequest>,
}

impl SchedulerHandle {
    /// Asks the running loop for [`Scheduler::update`] and waits for it.
    pub async fn update(
        &self,
        deferred_only: bool,
        announce: impl Into<String>,
        on_chunk: Option<ChunkSink>,
    ) -> Result<Option<UpdateOutcome>> {
        let (reply, outcome) = oneshot::channel();
        self.requests
            .send(SchedulerRequest::Update {
                deferred_only,
                announce: announce.into(),
                on_chunk,
                reply,
            })
            .await
            .map_err(|_| UpdaterError::SchedulerStopped)?;
        outcome.await.map_err(|_| UpdaterError::SchedulerStopped)
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("closed", &self.requests.is_closed())
            .finish()
    }
}

pub struct Scheduler {
    updater: Arc<Updater>,
    source: Box<dyn ConfigSource>,
    config: Arc<Config>,
    state: SchedulerState,
    requests: mpsc::Sender<SchedulerRequest>,
    inbox: mpsc::Receiver<SchedulerRequest>,
}

impl Scheduler {
    pub fn new(updater: Arc<Updater>, source: Box<dyn ConfigSource>, initial: Config) -> Self {
        let (requests, inbox) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        Self {
            updater,
            source,
            config: Arc::new(initial),
            state: SchedulerState::default(),
            requests,
            inbox,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            requests: self.requests.clone(),
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Configuration the current (or next) cycle runs with.
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub fn updater(&self) -> &Arc<Updater> {
        &self.updater
    }

    /// The timer one interval from now, in both clocks.
    fn next_timer(&self) -> ArmedTimer {
        // Clamped, so neither addition below can overflow.
        let interval = self.config.effective_interval();
        let now = Local::now();
        let next_check = chrono::Duration::from_std(interval)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(now);
        ArmedTimer {
            deadline: Instant::now() + interval,
            interval,
            next_check,
        }
    }

    /// Replaces any pending timer with `timer`.
    fn arm(&mut self, timer: ArmedTimer) {
        tracing::debug!(
            interval_secs = timer.interval.as_secs(),
            next_check = %format_timestamp(timer.next_check),
            "timer armed"
        );
        self.state.armed = Some(timer);
    }

    /// Logs the startup marker and arms the first timer.
    pub async fn start(&mut self) {
        let config = self.config();
        self.state.last_cycle_was_deferred = true;
        self.updater
            .run_update(&config, true, STARTUP_BANNER, None)
            .await;
        let timer = self.next_timer();
        self.arm(timer);
    }

    /// Sleeps until the armed timer fires. Returns at once if none is armed.
    pub async fn wait_for_timer(&mut self) {
        if let Some(timer) = self.state.armed.take() {
            tokio::time::sleep_until(timer.deadline).await;
        }
    }

    /// One full cycle: reload, outdated report, update or announce, re-arm.
    ///
    /// Nothing in here can fail outward; every error becomes an event.
    pub async fn run_cycle(&mut self) {
        self.reload();
        let config = self.config();
        let updater = Arc::clone(&self.updater);

        match updater.outdated(&config).await {
            Ok(report) => updater.log(&config, &report),
            Err(e) => {
                tracing::warn!("outdated check failed: {e}");
                updater.log(&config, &format!("error => {e}"));
                updater.emit_error(e.to_string());
            }
        }

        // The announced time and the real deadline come from the same instant,
        // however long the update below takes.
        let timer = self.next_timer();
        let announce = format!(
            "\r\n==== {}: next check => {}",
            updater.project().name,
            format_timestamp(timer.next_check)
        );

        let deferred = !config.autoupdate;
        self.state.last_cycle_was_deferred = deferred;
        let outcome = updater.run_update(&config, deferred, &announce, None).await;

        self.arm(timer);
        if let Some(outcome) = outcome {
            updater.announce_updated(&outcome).await;
        }
    }

    /// Runs `update` now, then re-arms the timer one interval later.
    ///
    /// With `deferred_only` nothing is executed and, in verbose mode,
    /// `announce` is logged; the timer is re-armed either way. Returns after
    /// the delayed `updated` event of a real run has gone out.
    pub async fn update(
        &mut self,
        deferred_only: bool,
        announce: &str,
        on_chunk: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> Option<UpdateOutcome> {
        let config = self.config();
        let updater = Arc::clone(&self.updater);

        self.state.armed = None;
        self.state.last_cycle_was_deferred = deferred_only;
        let outcome = updater
            .run_update(&config, deferred_only, announce, on_chunk)
            .await;

        let timer = self.next_timer();
        self.arm(timer);
        if let Some(outcome) = &outcome {
            updater.announce_updated(outcome).await;
        }
        outcome
    }

    /// Runs forever: startup pass, then one cycle per timer expiry, with host
    /// requests handled between cycles.
    pub async fn run(mut self) {
        self.start().await;
        loop {
            let deadline = self.state.armed.map(|timer| timer.deadline);
            let timer = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = timer => {
                    self.state.armed = None;
                    self.run_cycle().await;
                }
                Some(request) = self.inbox.recv() => self.serve(request).await,
            }
        }
    }

    async fn serve(&mut self, request: SchedulerRequest) {
        match request {
            SchedulerRequest::Update {
                deferred_only,
                announce,
                mut on_chunk,
                reply,
            } => {
                let mut forward = |chunk: &str| {
                    if let Some(sink) = on_chunk.as_deref_mut() {
                        sink(chunk);
                    }
                };
                let outcome = self.update(deferred_only, &announce, Some(&mut forward)).await;
                if reply.send(outcome).is_err() {
                    tracing::debug!("update requester went away before the reply");
                }
            }
        }
    }

    fn reload(&mut self) {
        match self.source.load() {
            Ok(config) => {
                if config != *self.config {
                    tracing::info!("configuration reloaded");
                }
                self.config = Arc::new(config);
            }
            Err(e) => {
                tracing::error!("config reload failed, keeping previous settings: {e:#}");
                self.updater.notifier().emit(UpdaterEvent::Error {
                    cause: format!("{e:#}"),
                    project: Some(self.updater.project().name.clone()),
                });
            }
        }
    }
}
