mod config_file;
pub use config_file::*;

use crate::events::EventChannel;
use crate::modes::Mode;
use crate::sync::Arc;
use crate::util::{rectify, Limit};
use serde_derive::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::*;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_ERR_COUNT: Limit = Limit::AtMost(10);
pub const DEFAULT_NUM_WORKERS: Limit = Limit::AtMost(1);

/// How a single worker behaves: how long it waits, and how much work and how many errors it
/// takes before it asks to be restarted.
///
/// Zero durations fall back to the defaults when read.
///
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[builder(build_fn(error = "ConfigError"))]
#[serde(default)]
pub struct WorkerConfig {
    /// How long a worker may sit without in-flight tasks before it closes itself.
    #[builder(default = "self.default_idle_timeout()")]
    #[serde(with = "crate::util::serde::seconds")]
    idle_timeout: Duration,

    /// How long a worker blocks waiting for new tasks or completions in one iteration.
    #[builder(default = "self.default_wait_interval()")]
    #[serde(with = "crate::util::serde::seconds")]
    wait_interval: Duration,

    /// How many tasks a worker accepts before it restarts.
    #[builder(default, setter(into))]
    max_task_count: Limit,

    /// How many failed tasks a worker tolerates before it restarts.
    #[builder(default = "self.default_max_err_count()", setter(into))]
    max_err_count: Limit,

    /// How many failed tasks in a row a worker tolerates before it restarts.
    #[builder(default, setter(into))]
    max_cons_err_count: Limit,

    /// Daemon workers are detached rather than joined when dropped.
    #[builder(default = "true")]
    daemon: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            wait_interval: DEFAULT_WAIT_INTERVAL,
            max_task_count: Limit::Unlimited,
            max_err_count: DEFAULT_MAX_ERR_COUNT,
            max_cons_err_count: Limit::Unlimited,
            daemon: true,
        }
    }
}

impl WorkerConfig {
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    pub fn idle_timeout(&self) -> Duration {
        rectify(self.idle_timeout, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn wait_interval(&self) -> Duration {
        rectify(self.wait_interval, DEFAULT_WAIT_INTERVAL)
    }

    pub fn max_task_count(&self) -> Limit {
        self.max_task_count
    }

    pub fn max_err_count(&self) -> Limit {
        self.max_err_count
    }

    pub fn max_cons_err_count(&self) -> Limit {
        self.max_cons_err_count
    }

    pub fn daemon(&self) -> bool {
        self.daemon
    }
}

impl WorkerConfigBuilder {
    fn default_idle_timeout(&self) -> Duration {
        DEFAULT_IDLE_TIMEOUT
    }

    fn default_wait_interval(&self) -> Duration {
        DEFAULT_WAIT_INTERVAL
    }

    fn default_max_err_count(&self) -> Limit {
        DEFAULT_MAX_ERR_COUNT
    }
}

/// How a manager runs its pool: which mode, how many workers, and how eagerly it drains the
/// response bus.
///
#[derive(Builder, Debug, Clone, Serialize, Deserialize)]
#[builder(build_fn(error = "ConfigError"))]
#[serde(default)]
pub struct ManagerConfig {
    #[builder(default)]
    mode: Mode,

    /// A fixed name for the manager. One is generated from the mode otherwise.
    #[builder(setter(into, strip_option), default = "None")]
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,

    /// The desired number of workers. Unlimited means the pool grows with the queue.
    #[builder(default = "self.default_num_workers()", setter(into))]
    num_workers: Limit,

    /// Grow towards `num_workers` as tasks queue up, instead of spawning them all at once.
    #[builder(default = "false")]
    incremental: bool,

    /// How long the drain loop waits for a response when there are none.
    #[builder(default = "self.default_wait_interval()")]
    #[serde(with = "crate::util::serde::seconds")]
    wait_interval: Duration,

    /// How many responses are handled per drain iteration. Zero means one per worker.
    #[builder(default, setter(into))]
    max_processing_responses_per_iteration: Limit,

    /// The configuration every worker in the pool is created with.
    #[builder(default)]
    worker: WorkerConfig,

    /// NOTE: this is safe to clone since it is really an [Arc] to a shared queue.
    #[builder(default = "self.default_event_channel()")]
    #[serde(skip)]
    event_channel: Arc<EventChannel>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            name: None,
            num_workers: DEFAULT_NUM_WORKERS,
            incremental: false,
            wait_interval: DEFAULT_WAIT_INTERVAL,
            max_processing_responses_per_iteration: Limit::Unlimited,
            worker: WorkerConfig::default(),
            event_channel: Arc::new(EventChannel::new()),
        }
    }
}

impl ManagerConfig {
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn num_workers(&self) -> Limit {
        self.num_workers
    }

    pub fn incremental(&self) -> bool {
        self.incremental
    }

    pub fn wait_interval(&self) -> Duration {
        rectify(self.wait_interval, DEFAULT_WAIT_INTERVAL)
    }

    /// The number of responses to handle per drain iteration, with zero standing in for the
    /// number of workers.
    pub fn max_processing_responses_per_iteration(&self) -> Limit {
        match self.max_processing_responses_per_iteration {
            Limit::AtMost(0) => self.num_workers,
            limit => limit,
        }
    }

    pub fn worker(&self) -> &WorkerConfig {
        &self.worker
    }

    pub fn event_channel(&self) -> Arc<EventChannel> {
        self.event_channel.clone()
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }
}

impl ManagerConfigBuilder {
    fn default_num_workers(&self) -> Limit {
        DEFAULT_NUM_WORKERS
    }

    fn default_wait_interval(&self) -> Duration {
        DEFAULT_WAIT_INTERVAL
    }

    fn default_event_channel(&self) -> Arc<EventChannel> {
        EventChannel::new().into()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Attempted to build a config struct while missing fields: {0:?}")]
    BuilderError(derive_builder::UninitializedFieldError),

    #[error("Could not read pool config file at {path:?} due to {err:?}")]
    CouldNotReadFile { path: PathBuf, err: std::io::Error },

    #[error("Could not parse pool config file: {0:?}")]
    ParseError(serde_json::Error),

    #[error("Unknown pool mode {0:?}")]
    UnknownMode(String),
}

impl From<derive_builder::UninitializedFieldError> for ConfigError {
    fn from(err: derive_builder::UninitializedFieldError) -> Self {
        Self::BuilderError(err)
    }
}
