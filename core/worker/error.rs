use thiserror::*;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker {0:?} is already started")]
    AlreadyStarted(String),

    #[error("Could not spawn a thread for worker {name:?} due to {err:?}")]
    CouldNotSpawn { name: String, err: std::io::Error },

    #[error("Could not build a scheduler for worker {name:?} due to {err:?}")]
    CouldNotBuildRuntime { name: String, err: std::io::Error },

    #[error("Worker {0:?} exited before it was ready")]
    ExitedBeforeReady(String),
}
