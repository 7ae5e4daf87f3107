use crate::config::ConfigError;
use crate::model::CallableKind;
use crate::modes::Mode;
use crate::worker::WorkerError;
use std::time::Duration;
use thiserror::*;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Manager {0:?} is not running")]
    NotRunning(String),

    #[error("Manager {0:?} is already started")]
    AlreadyStarted(String),

    #[error("Manager {0:?} was terminated and cannot be started again")]
    Terminated(String),

    #[error("Pools in {mode} mode cannot run {kind} callables")]
    UnsupportedCallable { mode: Mode, kind: CallableKind },

    #[error("A task named {0:?} is already in flight")]
    DuplicateTaskName(String),

    #[error("Manager {name:?} did not shut down within {timeout:?}")]
    ShutdownTimedOut { name: String, timeout: Duration },

    #[error("Could not spawn the drain thread for manager {name:?} due to {err:?}")]
    CouldNotSpawn { name: String, err: std::io::Error },

    #[error(transparent)]
    WorkerError(WorkerError),

    #[error(transparent)]
    ConfigError(ConfigError),
}

impl From<WorkerError> for ManagerError {
    fn from(value: WorkerError) -> Self {
        ManagerError::WorkerError(value)
    }
}

impl From<ConfigError> for ManagerError {
    fn from(value: ConfigError) -> Self {
        ManagerError::ConfigError(value)
    }
}
