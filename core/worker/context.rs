use super::{WorkerError, WorkerState};
use crate::bus::Bus;
use crate::config::WorkerConfig;
use crate::events::event::TaskEvent;
use crate::events::EventChannel;
use crate::model::{Action, ActionFlag, Completion, Job, Outcome, Task, TaskError};
use crate::sync::Arc;
use crossbeam::channel::Sender;
use tracing::*;

/// Everything a worker thread needs to run its loop.
///
/// The context only ever writes to the task and response buses it shares with its manager, and
/// reads from its own request bus.
///
pub(crate) struct WorkerContext {
    pub(crate) name: String,
    pub(crate) config: WorkerConfig,
    pub(crate) task_bus: Bus<Task>,
    pub(crate) request_bus: Bus<Action>,
    pub(crate) response_bus: Bus<Action>,
    pub(crate) state: Arc<WorkerState>,
    pub(crate) event_channel: Arc<EventChannel>,
    ready: Sender<Result<(), WorkerError>>,
}

impl WorkerContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        config: WorkerConfig,
        task_bus: Bus<Task>,
        request_bus: Bus<Action>,
        response_bus: Bus<Action>,
        state: Arc<WorkerState>,
        event_channel: Arc<EventChannel>,
        ready: Sender<Result<(), WorkerError>>,
    ) -> Self {
        Self {
            name,
            config,
            task_bus,
            request_bus,
            response_bus,
            state,
            event_channel,
            ready,
        }
    }

    /// Mark the worker as running and release whoever is waiting in `Worker::start`.
    pub(crate) fn begin(&self) {
        self.state.begin();
        let _ = self.ready.send(Ok(()));
    }

    pub(crate) fn fail_to_begin(&self, err: WorkerError) {
        let _ = self.ready.send(Err(err));
    }

    pub(crate) fn respond(&self, action: Action) {
        self.response_bus.push(action)
    }

    /// A lifecycle action for this worker, to be posted once the loop has wound down.
    pub(crate) fn lifecycle(&self, flag: ActionFlag) -> Action {
        Action::new(flag).with_worker(&self.name)
    }

    /// Handle every pending request. Returns the lifecycle action to end the loop with, if a
    /// `CLOSE` or `RESTART` was requested.
    pub(crate) fn drain_requests(&self) -> Option<Action> {
        while let Some(request) = self.request_bus.try_pop() {
            trace!("Worker {} got request {:?}", self.name, request.flag());
            if request.matches(ActionFlag::RESET) {
                self.state.reset_counters();
            }
            let flag = request.flag() & (ActionFlag::CLOSE | ActionFlag::RESTART);
            if !flag.is_none() {
                return Some(self.lifecycle(flag));
            }
        }
        None
    }

    /// Claim a task off the bus. Tasks that were cancelled while queued are reported and
    /// dropped without counting against any budget.
    pub(crate) fn pick_up(&self, task: Task) -> Option<(String, Job, Arc<dyn Completion>)> {
        let (name, job, completion) = task.into_parts();
        if !completion.set_running() {
            debug!("Worker {} skipped cancelled task {}", self.name, name);
            self.respond(Action::exception(
                &name,
                &self.name,
                TaskError::Cancelled(name.clone()),
            ));
            self.event_channel
                .send(TaskEvent::TaskCancelled { task: name });
            return None;
        }
        self.state.record_accepted();
        Some((name, job, completion))
    }

    /// Record how a task went and report it to the manager. Returns true when this exhausted
    /// one of the worker's budgets.
    pub(crate) fn report(&self, task: &str, outcome: Outcome) -> bool {
        match outcome {
            Ok(()) => {
                self.state.record_success();
                self.respond(Action::done(task, &self.name));
                self.event_channel.send(TaskEvent::TaskCompleted {
                    task: task.to_string(),
                    worker: self.name.clone(),
                });
            }
            Err(err) => {
                debug!("Task {} failed on worker {}: {}", task, self.name, err);
                self.state.record_failure();
                self.event_channel.send(TaskEvent::TaskFailed {
                    task: task.to_string(),
                    worker: self.name.clone(),
                    error: err.to_string(),
                });
                self.respond(Action::exception(task, &self.name, err));
            }
        }
        self.state.is_exhausted(&self.config)
    }

    /// Report a task that was dropped because the worker was terminated.
    pub(crate) fn abandon(&self, task: &str, completion: &dyn Completion) {
        let err = TaskError::Terminated(task.to_string());
        completion.reject(err.clone());
        self.respond(Action::exception(task, &self.name, err));
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}
