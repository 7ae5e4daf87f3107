use super::{Callable, CallableKind, Completion, Slot, TaskError, TaskHandle};
use crate::sync::Arc;
use futures::future::{FutureExt, LocalBoxFuture};
use std::panic::AssertUnwindSafe;

/// What a worker learns after running a [Job]. The handle has already been settled by then.
pub type Outcome = Result<(), TaskError>;

/// A type-erased callable that settles its own handle when run.
///
/// Panics inside the callable are caught and turned into [TaskError::Panicked], so running a
/// job never unwinds into the worker.
///
pub(crate) enum Job {
    Async(Box<dyn FnOnce() -> LocalBoxFuture<'static, Outcome> + Send>),
    Blocking(Box<dyn FnOnce() -> Outcome + Send>),
}

impl Job {
    fn new<T: Send + 'static>(callable: Callable<T>, slot: Arc<Slot<T>>) -> Self {
        match callable {
            Callable::Async(f) => Job::Async(Box::new(move || {
                async move {
                    let fut = match std::panic::catch_unwind(AssertUnwindSafe(f)) {
                        Ok(fut) => fut,
                        Err(payload) => return reject(&slot, TaskError::panicked(payload)),
                    };
                    match AssertUnwindSafe(fut).catch_unwind().await {
                        Ok(result) => settle(&slot, result),
                        Err(payload) => reject(&slot, TaskError::panicked(payload)),
                    }
                }
                .boxed_local()
            })),
            Callable::Blocking(f) => Job::Blocking(Box::new(move || {
                match std::panic::catch_unwind(AssertUnwindSafe(f)) {
                    Ok(result) => settle(&slot, result),
                    Err(payload) => reject(&slot, TaskError::panicked(payload)),
                }
            })),
        }
    }

    pub(crate) fn kind(&self) -> CallableKind {
        match self {
            Job::Async(_) => CallableKind::Async,
            Job::Blocking(_) => CallableKind::Blocking,
        }
    }

    /// Run the job as a future. Blocking jobs run inline on first poll.
    pub(crate) async fn run(self) -> Outcome {
        match self {
            Job::Async(f) => f().await,
            Job::Blocking(f) => f(),
        }
    }
}

fn settle<T: Send>(slot: &Slot<T>, result: anyhow::Result<T>) -> Outcome {
    match result {
        Ok(value) => {
            slot.finish(Ok(value));
            Ok(())
        }
        Err(err) => reject(slot, TaskError::failed(err)),
    }
}

fn reject<T: Send>(slot: &Slot<T>, err: TaskError) -> Outcome {
    slot.reject(err.clone());
    Err(err)
}

/// A submitted unit of work, travelling on the task bus from the manager to a worker.
///
/// Creating a task also creates the [TaskHandle] its result will be delivered through.
///
pub struct Task {
    name: String,
    job: Job,
    completion: Arc<dyn Completion>,
}

impl Task {
    pub fn new<T: Send + 'static>(
        name: String,
        callable: Callable<T>,
    ) -> (Task, TaskHandle<T>) {
        let slot = Arc::new(Slot::new(name.clone()));
        let job = Job::new(callable, slot.clone());
        let task = Task {
            name,
            job,
            completion: slot.clone(),
        };
        (task, TaskHandle::new(slot))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CallableKind {
        self.job.kind()
    }

    pub(crate) fn completion(&self) -> Arc<dyn Completion> {
        self.completion.clone()
    }

    pub(crate) fn into_parts(self) -> (String, Job, Arc<dyn Completion>) {
        (self.name, self.job, self.completion)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("done", &self.completion.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn explode() -> anyhow::Result<u32> {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn running_a_job_resolves_its_handle() {
        let (task, handle) = Task::new(
            "t".to_string(),
            Callable::future(|| async { anyhow::Ok(10) }),
        );
        let (_, job, completion) = task.into_parts();
        assert!(completion.set_running());
        assert_matches!(job.run().await, Ok(()));
        assert_eq!(handle.await.unwrap(), 10);
    }

    #[tokio::test]
    async fn failures_reject_the_handle_and_are_reported() {
        let (task, handle) = Task::new(
            "t".to_string(),
            Callable::future(|| async { Err::<u32, _>(anyhow::anyhow!("boom")) }),
        );
        let (_, job, _) = task.into_parts();
        let outcome = job.run().await;
        assert_matches!(&outcome, Err(TaskError::Failed(err)) if err.to_string() == "boom");
        assert_matches!(handle.await, Err(TaskError::Failed(_)));
    }

    #[tokio::test]
    async fn panics_are_caught() {
        let (task, handle) = Task::new("t".to_string(), Callable::future(explode));
        let (_, job, _) = task.into_parts();
        assert_matches!(job.run().await, Err(TaskError::Panicked(msg)) if msg == "kaboom");
        assert_matches!(handle.await, Err(TaskError::Panicked(_)));
    }

    #[test]
    fn blocking_panics_are_caught() {
        let (task, handle) = Task::new(
            "t".to_string(),
            Callable::<u32>::blocking(|| panic!("sync kaboom")),
        );
        let (_, job, _) = task.into_parts();
        let Job::Blocking(f) = job else {
            panic!("expected a blocking job");
        };
        assert_matches!(f(), Err(TaskError::Panicked(_)));
        assert_matches!(handle.wait(), Err(TaskError::Panicked(msg)) if msg == "sync kaboom");
    }

    #[test]
    fn cancelled_tasks_cannot_be_picked_up() {
        let (task, handle) = Task::new("t".to_string(), Callable::blocking(|| anyhow::Ok(())));
        assert!(handle.cancel());
        assert!(!task.completion().set_running());
        assert!(task.completion().is_done());
    }
}
