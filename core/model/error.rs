use crate::sync::Arc;
use std::any::Any;
use thiserror::Error;

/// The reason a [TaskHandle](super::TaskHandle) was rejected.
///
/// Errors raised by the callable itself are kept behind an [Arc] so the same error can be
/// delivered to the submitter and reported on the response bus.
///
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    #[error("Task {0:?} was cancelled before a worker picked it up")]
    Cancelled(String),

    #[error("{0}")]
    Failed(Arc<anyhow::Error>),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task {0:?} was still queued when the pool shut down")]
    Shutdown(String),

    #[error("Task {0:?} was abandoned because its worker was terminated")]
    Terminated(String),

    #[error("The result of task {0:?} was already taken")]
    Consumed(String),
}

impl TaskError {
    pub fn failed<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Failed(Arc::new(err.into()))
    }

    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(msg) = payload.downcast_ref::<&str>() {
            msg.to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(msg)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// The error returned by the callable, if this is a callable failure.
    pub fn source_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_display_the_callable_message() {
        let err = TaskError::failed(anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "boom");
        assert!(err.source_error().is_some());
    }

    #[test]
    fn panic_payloads_are_turned_into_messages() {
        let err = TaskError::panicked(Box::new("oh no"));
        assert_matches!(err, TaskError::Panicked(msg) if msg == "oh no");

        let err = TaskError::panicked(Box::new(String::from("formatted 1")));
        assert_matches!(err, TaskError::Panicked(msg) if msg == "formatted 1");

        let err = TaskError::panicked(Box::new(42_u8));
        assert_matches!(err, TaskError::Panicked(_));
    }
}
