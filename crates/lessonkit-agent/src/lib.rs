//! # LessonKit Agent
//!
//! Wires the service worker registration, the reminder scheduler and the
//! control channel into one running agent.
//!
//! ## Commands
//!
//! The binary feeds newline-delimited commands to [`Agent::execute`]:
//!
//! - a JSON object is posted to the control channel
//!   (`{"type": "SCHEDULE_UPDATED", "payload": [...]}`)
//! - `GET <url>` dispatches a fetch event and reports `<status> <origin>`

use std::sync::Arc;

use lessonkit_common::{LessonKitError, Result};
use lessonkit_net::{Fetcher, Request, ResourceLoader};
use lessonkit_reminders::{
    control_channel, run_control_loop, Clock, ControlSender, NotificationCenter,
    NotificationPermission, Notifier, ReminderScheduler, SystemClock,
};
use lessonkit_sw::{FetchOutcome, Registration, ServiceWorkerError, ServiceWorkerEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub mod config;

pub use config::AgentConfig;

/// Where the response to a dispatched fetch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOrigin {
    Network,
    Cache,
    PassThrough,
    None,
}

impl ResponseOrigin {
    pub fn of(outcome: &FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::PassThrough(_) => ResponseOrigin::PassThrough,
            FetchOutcome::Handled { response: None, .. } => ResponseOrigin::None,
            FetchOutcome::Handled {
                response: Some(response),
                ..
            } => {
                if response.from_cache {
                    ResponseOrigin::Cache
                } else {
                    ResponseOrigin::Network
                }
            }
        }
    }
}

impl std::fmt::Display for ResponseOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResponseOrigin::Network => "network",
            ResponseOrigin::Cache => "cache",
            ResponseOrigin::PassThrough => "passthrough",
            ResponseOrigin::None => "none",
        };
        f.write_str(s)
    }
}

/// A parsed stdin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Dispatch a GET fetch event.
    Fetch(String),
    /// Post a control message (raw JSON).
    Control(String),
    /// Blank line.
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Command::Empty);
        }
        if line.starts_with('{') {
            return Ok(Command::Control(line.to_string()));
        }
        match line.split_once(char::is_whitespace) {
            Some((verb, url)) if verb.eq_ignore_ascii_case("GET") => {
                Ok(Command::Fetch(url.trim().to_string()))
            }
            _ => Err(LessonKitError::InvalidArgument(format!(
                "unrecognized command: {}",
                line
            ))),
        }
    }
}

/// The running agent.
pub struct Agent {
    config: AgentConfig,
    registration: Registration,
    scheduler: Arc<ReminderScheduler>,
    control: ControlSender,
    control_task: JoinHandle<usize>,
    event_task: JoinHandle<()>,
}

impl Agent {
    /// Register and activate the worker, then start the control loop.
    pub async fn start(
        config: AgentConfig,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;

        let (registration, events) = Registration::new(config.origin_url()?);
        let event_task = tokio::spawn(log_events(events));

        let worker = registration
            .register(config.worker_config()?, fetcher)
            .await
            .map_err(|e| worker_error("service worker registration failed", e))?;
        info!(worker = %worker.id, scope = %registration.scope, "Service worker active");

        let mut scheduler = ReminderScheduler::new(clock, notifier);
        if let Some(icon) = &config.notifications.icon {
            scheduler = scheduler.with_icon(icon.clone());
        }
        let scheduler = Arc::new(scheduler);

        let (control, rx) = control_channel();
        let control_task = tokio::spawn(run_control_loop(rx, scheduler.clone()));

        Ok(Self {
            config,
            registration,
            scheduler,
            control,
            control_task,
            event_task,
        })
    }

    /// Start with the HTTP loader, the system clock and an in-process
    /// notification center.
    pub async fn with_defaults(config: AgentConfig) -> Result<Self> {
        let loader = ResourceLoader::new(config.loader_config())
            .map_err(|e| LessonKitError::network_with_source("failed to build HTTP client", e))?;
        let notifier = NotificationCenter::new(NotificationPermission::Granted);
        Self::start(config, Arc::new(loader), Arc::new(SystemClock), Arc::new(notifier)).await
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    pub fn scheduler(&self) -> &Arc<ReminderScheduler> {
        &self.scheduler
    }

    /// A new sender for the control channel.
    pub fn control(&self) -> ControlSender {
        self.control.clone()
    }

    /// Dispatch a GET fetch event for `url`.
    pub async fn fetch(&self, url: &str) -> Result<FetchOutcome> {
        let request =
            Request::parse_get(url).map_err(|e| LessonKitError::InvalidArgument(e.to_string()))?;
        self.registration
            .handle_fetch(&request)
            .await
            .map_err(|e| worker_error(format!("fetch of {} failed", url), e))
    }

    /// Run one stdin command and return the line to print, if any.
    pub async fn execute(&self, line: &str) -> Result<Option<String>> {
        match Command::parse(line)? {
            Command::Empty => Ok(None),
            Command::Control(json) => {
                self.control.post_json(&json).map_err(|e| {
                    LessonKitError::InvalidArgument(format!("control message rejected: {}", e))
                })?;
                Ok(None)
            }
            Command::Fetch(url) => {
                let outcome = self.fetch(&url).await?;
                let status = outcome
                    .response()
                    .map(|r| r.status.as_u16().to_string())
                    .unwrap_or_else(|| "-".to_string());
                Ok(Some(format!("{} {}", status, ResponseOrigin::of(&outcome))))
            }
        }
    }

    /// Drain the control channel, then cancel every reminder.
    ///
    /// Waits for every outstanding [`ControlSender`] to be dropped. Returns
    /// the number of control messages applied.
    pub async fn shutdown(self) -> Result<usize> {
        let Agent {
            scheduler,
            control,
            control_task,
            event_task,
            ..
        } = self;

        drop(control);
        let applied = control_task
            .await
            .map_err(|e| LessonKitError::internal(format!("control loop failed: {}", e)))?;
        scheduler.clear().await;
        event_task.abort();

        info!(applied, "Agent shut down");
        Ok(applied)
    }
}

/// Cache storage failures surface as [`LessonKitError::Cache`], the rest as network errors.
fn worker_error(message: impl Into<String>, error: ServiceWorkerError) -> LessonKitError {
    if matches!(error, ServiceWorkerError::CacheUnavailable(_)) {
        LessonKitError::cache_with_source(message, error)
    } else {
        LessonKitError::network_with_source(message, error)
    }
}

async fn log_events(mut events: mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ServiceWorkerEvent::StateChange { worker_id, new_state } => {
                debug!(worker = %worker_id, state = %new_state, "Worker event");
            }
            ServiceWorkerEvent::CacheDeleted { name } => {
                debug!(namespace = %name, "Cache deleted event");
            }
            ServiceWorkerEvent::ControllerChange { client_id, worker_id } => {
                debug!(client = %client_id, worker = %worker_id, "Controller change event");
            }
        }
    }
}
