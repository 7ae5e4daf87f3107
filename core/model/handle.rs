use super::TaskError;
use crate::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

enum Phase<T> {
    Pending,
    Running,
    Finished(Option<Result<T, TaskError>>),
}

struct Inner<T> {
    phase: Phase<T>,
    cancelled: bool,
    waker: Option<Waker>,
}

/// The write-once slot shared between a [TaskHandle] and whoever settles it.
pub(crate) struct Slot<T> {
    name: String,
    inner: Mutex<Inner<T>>,
    done: Condvar,
}

impl<T> Slot<T> {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            inner: Mutex::new(Inner {
                phase: Phase::Pending,
                cancelled: false,
                waker: None,
            }),
            done: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settle the slot. Returns false if it had already been settled.
    pub(crate) fn finish(&self, result: Result<T, TaskError>) -> bool {
        let mut inner = self.lock();
        if matches!(inner.phase, Phase::Finished(_)) {
            return false;
        }
        inner.phase = Phase::Finished(Some(result));
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
        drop(inner);
        self.done.notify_all();
        true
    }
}

/// The type-erased side of a [Slot] that workers and managers hold on to.
///
pub(crate) trait Completion: Send + Sync {
    /// Move the task from pending to running. Returns false if the task was cancelled (or
    /// otherwise settled) before anyone picked it up, in which case it must not be run.
    fn set_running(&self) -> bool;

    fn reject(&self, err: TaskError) -> bool;

    fn is_done(&self) -> bool;
}

impl<T: Send> Completion for Slot<T> {
    fn set_running(&self) -> bool {
        let mut inner = self.lock();
        match inner.phase {
            Phase::Pending => {
                inner.phase = Phase::Running;
                true
            }
            Phase::Running => true,
            Phase::Finished(_) => false,
        }
    }

    fn reject(&self, err: TaskError) -> bool {
        self.finish(Err(err))
    }

    fn is_done(&self) -> bool {
        matches!(self.lock().phase, Phase::Finished(_))
    }
}

/// A handle to the eventual result of a submitted task.
///
/// The handle can be waited on from synchronous code with [TaskHandle::wait], or awaited from
/// asynchronous code since it implements [Future]. The result can only be taken once.
///
/// Cancelling only works while the task is still queued: once a worker has picked it up the
/// task runs to completion.
///
pub struct TaskHandle<T> {
    slot: Arc<Slot<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(slot: Arc<Slot<T>>) -> Self {
        Self { slot }
    }

    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// Cancel the task if no worker has picked it up yet. The handle is then rejected with
    /// [TaskError::Cancelled].
    ///
    /// Returns true if the task is cancelled after this call.
    pub fn cancel(&self) -> bool {
        let mut inner = self.slot.lock();
        match inner.phase {
            Phase::Pending => {
                inner.phase = Phase::Finished(Some(Err(TaskError::Cancelled(
                    self.slot.name.clone(),
                ))));
                inner.cancelled = true;
                if let Some(waker) = inner.waker.take() {
                    waker.wake();
                }
                drop(inner);
                self.slot.done.notify_all();
                true
            }
            Phase::Finished(_) => inner.cancelled,
            Phase::Running => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.lock().cancelled
    }

    pub fn is_running(&self) -> bool {
        matches!(self.slot.lock().phase, Phase::Running)
    }

    pub fn is_done(&self) -> bool {
        matches!(self.slot.lock().phase, Phase::Finished(_))
    }

    /// Block the current thread until the task is settled, and take its result.
    pub fn wait(self) -> Result<T, TaskError> {
        let mut inner = self.slot.lock();
        loop {
            if let Phase::Finished(result) = &mut inner.phase {
                return result
                    .take()
                    .unwrap_or_else(|| Err(TaskError::Consumed(self.slot.name.clone())));
            }
            inner = self
                .slot
                .done
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most `timeout` until the task is settled. Returns whether it is.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.slot.lock();
        loop {
            if matches!(inner.phase, Phase::Finished(_)) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            inner = match self.slot.done.wait_timeout(inner, deadline - now) {
                Ok((inner, _)) => inner,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Take the result if the task is already settled.
    pub fn try_take(&self) -> Option<Result<T, TaskError>> {
        match &mut self.slot.lock().phase {
            Phase::Finished(result) => result.take(),
            _ => None,
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.slot.lock();
        if let Phase::Finished(result) = &mut inner.phase {
            return Poll::Ready(
                result
                    .take()
                    .unwrap_or_else(|| Err(TaskError::Consumed(self.slot.name.clone()))),
            );
        }
        inner.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.slot.lock().phase {
            Phase::Pending => "pending",
            Phase::Running => "running",
            Phase::Finished(_) => "finished",
        };
        f.debug_struct("TaskHandle")
            .field("name", &self.slot.name)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_handle() -> (Arc<Slot<u32>>, TaskHandle<u32>) {
        let slot = Arc::new(Slot::new("task-0".to_string()));
        (slot.clone(), TaskHandle::new(slot))
    }

    #[test]
    fn finishing_resolves_the_handle_once() {
        let (slot, handle) = new_handle();
        assert!(!handle.is_done());
        assert!(slot.finish(Ok(1)));
        assert!(!slot.finish(Ok(2)));
        assert!(!slot.reject(TaskError::Shutdown("task-0".into())));
        assert!(handle.is_done());
        assert_eq!(handle.wait().unwrap(), 1);
    }

    #[test]
    fn cancelling_a_pending_task_rejects_it() {
        let (slot, handle) = new_handle();
        assert!(handle.cancel());
        assert!(handle.is_cancelled());
        assert!(!slot.set_running());
        assert!(!slot.finish(Ok(1)));
        assert_matches!(handle.wait(), Err(TaskError::Cancelled(name)) if name == "task-0");
    }

    #[test]
    fn cancelling_a_running_task_is_not_honored() {
        let (slot, handle) = new_handle();
        assert!(slot.set_running());
        assert!(handle.is_running());
        assert!(!handle.cancel());
        assert!(!handle.is_cancelled());
        slot.finish(Ok(7));
        assert_eq!(handle.wait().unwrap(), 7);
    }

    #[test]
    fn waiting_blocks_until_another_thread_settles() {
        let (slot, handle) = new_handle();
        let settler = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            slot.finish(Ok(42));
        });
        assert_eq!(handle.wait().unwrap(), 42);
        settler.join().unwrap();
    }

    #[test]
    fn waiting_with_a_timeout_gives_up() {
        let (_slot, handle) = new_handle();
        assert!(!handle.wait_timeout(Duration::from_millis(10)));
        assert!(handle.try_take().is_none());
    }

    #[test]
    fn the_result_can_only_be_taken_once() {
        let (slot, handle) = new_handle();
        slot.finish(Ok(3));
        assert_matches!(handle.try_take(), Some(Ok(3)));
        assert_matches!(handle.wait(), Err(TaskError::Consumed(_)));
    }

    #[tokio::test]
    async fn handles_can_be_awaited() {
        let (slot, handle) = new_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            slot.finish(Ok(5));
        });
        assert_eq!(handle.await.unwrap(), 5);
    }

    #[cfg(shuttle)]
    #[test]
    fn conc_cancel_and_pickup_never_both_win() {
        use crate::sync::*;

        shuttle::check_dfs(
            move || {
                let slot = Arc::new(Slot::<u32>::new("task-0".to_string()));
                let handle = TaskHandle::new(slot.clone());

                let picker = {
                    let slot = slot.clone();
                    thread::spawn(move || slot.set_running())
                };
                let cancelled = handle.cancel();
                let picked = picker.join().unwrap();

                assert!(cancelled != picked);
            },
            None,
        );
    }
}
