use std::sync::{Arc, RwLock};

/// Everything the updater tells its host about.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdaterEvent {
    /// A block was appended to the durable log.
    Log(String),
    /// A real `update` run is about to start.
    Update { project: String },
    /// A real `update` run finished. `did_change` means the host should restart.
    Updated {
        project: String,
        did_change: bool,
        transcript: String,
    },
    /// Something failed inside a cycle. The scheduler keeps running.
    Error {
        cause: String,
        project: Option<String>,
    },
}

impl UpdaterEvent {
    pub fn channel(&self) -> Channel {
        match self {
            UpdaterEvent::Log(_) => Channel::Log,
            UpdaterEvent::Update { .. } => Channel::Update,
            UpdaterEvent::Updated { .. } => Channel::Updated,
            UpdaterEvent::Error { .. } => Channel::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Log,
    Update,
    Updated,
    Error,
}

type Handler = Arc<dyn Fn(&UpdaterEvent) + Send + Sync>;

/// Observer registry for [`UpdaterEvent`]s.
///
/// Handlers run synchronously on the emitting task, in subscription order.
/// A handler that blocks stalls the scheduler.
#[derive(Default)]
pub struct EventNotifier {
    handlers: RwLock<Vec<(Channel, Handler)>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every event on `channel`.
    pub fn subscribe<F>(&self, channel: Channel, handler: F)
    where
        F: Fn(&UpdaterEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((channel, Arc::new(handler)));
    }

    pub fn on_log<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.subscribe(Channel::Log, move |event| {
            if let UpdaterEvent::Log(message) = event {
                handler(message);
            }
        });
    }

    pub fn on_update<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.subscribe(Channel::Update, move |event| {
            if let UpdaterEvent::Update { project } = event {
                handler(project);
            }
        });
    }

    pub fn on_updated<F>(&self, handler: F)
    where
        F: Fn(&str, bool, &str) + Send + Sync + 'static,
    {
        self.subscribe(Channel::Updated, move |event| {
            if let UpdaterEvent::Updated {
                project,
                did_change,
                transcript,
            } = event
            {
                handler(project, *did_change, transcript);
            }
        });
    }

    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&str, Option<&str>) + Send + Sync + 'static,
    {
        self.subscribe(Channel::Error, move |event| {
            if let UpdaterEvent::Error { cause, project } = event {
                handler(cause, project.as_deref());
            }
        });
    }

    /// Delivers `event` to every handler on its channel.
    pub fn emit(&self, event: UpdaterEvent) {
        let channel = event.channel();
        // Snapshot first so handlers may subscribe without deadlocking.
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(&event);
        }
    }
}

impl std::fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .handlers
            .read()
            .map(|h| h.len())
            .unwrap_or_default();
        f.debug_struct("EventNotifier")
            .field("handlers", &count)
            .finish()
    }
}
