//! # Managers
//!
//! A manager owns a pool: the task bus every worker pulls from, the response bus every worker
//! reports to, and the registries of in-flight tasks and live workers. Submitting a task puts it
//! on the task bus and grows the pool according to its [ScalingPolicy]. A dedicated drain thread
//! consumes responses: it retires finished tasks, forgets closed workers and restarts the ones
//! that ran out of budget.
//!
mod error;
mod scaling;

pub use error::*;
pub use scaling::*;

use crate::bus::Bus;
use crate::config::{ConfigError, ManagerConfig};
use crate::events::event::{ManagerEvent, TaskEvent, WorkerEvent};
use crate::events::{EventChannel, EventConsumer};
use crate::model::{Action, ActionFlag, Callable, Completion, Task, TaskError, TaskHandle};
use crate::modes::{self, Mode, ModeSpec};
use crate::sync::atomic::{AtomicBool, Ordering};
use crate::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use crate::util::Sequence;
use crate::worker::{Worker, WorkerSpec, WorkerStats};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::*;

/// How long dropping a running manager waits for it to shut down.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct TaskRecord {
    completion: Arc<dyn Completion>,
    submitted_at: Instant,
}

struct DrainThread {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

/// The state shared between the manager handle and its drain thread.
struct Shared {
    name: String,
    config: ManagerConfig,
    mode: &'static ModeSpec,
    policy: ScalingPolicy,

    task_bus: Bus<Task>,
    response_bus: Bus<Action>,

    /// Held across scaling decisions, so concurrent submits cannot overshoot a bounded pool.
    workers: Mutex<BTreeMap<String, Worker>>,
    tasks: DashMap<String, TaskRecord>,

    worker_seq: Sequence,
    task_seq: Sequence,

    running: AtomicBool,
    terminated: AtomicBool,

    /// Submits hold this for reading and lifecycle changes for writing, so no task can land on
    /// the bus after the manager has begun shutting down.
    lifecycle: RwLock<()>,

    event_channel: Arc<EventChannel>,
}

/// A pool of workers running submitted tasks.
///
/// ```no_run
/// use hybrid_pool_core::{Callable, Manager, ManagerConfig};
/// use std::time::Duration;
///
/// let manager = Manager::new(ManagerConfig::default());
/// manager.start()?;
/// let handle = manager.submit(Callable::future(|| async { anyhow::Ok(2 + 2) }))?;
/// assert_eq!(handle.wait()?, 4);
/// manager.stop(Duration::from_secs(5))?;
/// # Ok::<(), anyhow::Error>(())
/// ```
///
pub struct Manager {
    shared: Arc<Shared>,
    drain: Mutex<Option<DrainThread>>,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Self {
        let mode = config.mode().spec();
        let name = match config.name() {
            Some(name) => name.to_string(),
            None => {
                let suffix: String = uuid::Uuid::new_v4()
                    .as_simple()
                    .to_string()
                    .chars()
                    .take(8)
                    .collect();
                mode.manager_name(&suffix)
            }
        };
        let policy = ScalingPolicy::new(config.num_workers(), config.incremental());
        let event_channel = config.event_channel();

        Self {
            shared: Arc::new(Shared {
                name,
                mode,
                policy,
                config,
                task_bus: Bus::new(),
                response_bus: Bus::new(),
                workers: Mutex::new(BTreeMap::new()),
                tasks: DashMap::new(),
                worker_seq: Sequence::new(),
                task_seq: Sequence::new(),
                running: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
                lifecycle: RwLock::new(()),
                event_channel,
            }),
            drain: Mutex::new(None),
        }
    }

    /// Build a manager for the mode registered under `tag`, overriding the mode in `config`.
    pub fn with_mode(tag: &str, mut config: ManagerConfig) -> Result<Self, ManagerError> {
        let mode = modes::lookup(tag).ok_or_else(|| ConfigError::UnknownMode(tag.to_string()))?;
        config.set_mode(mode.mode());
        Ok(Self::new(config))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn mode(&self) -> Mode {
        self.shared.mode.mode()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    pub fn is_alive(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn worker_count(&self) -> usize {
        self.shared.workers().len()
    }

    /// The number of tasks submitted but not yet reported back by a worker.
    pub fn task_count(&self) -> usize {
        self.shared.tasks.len()
    }

    /// The number of tasks waiting on the bus for a worker to pick them up.
    pub fn queued_count(&self) -> usize {
        self.shared.task_bus.len()
    }

    pub fn workers(&self) -> Vec<WorkerStats> {
        self.shared.workers().values().map(Worker::stats).collect()
    }

    /// Start observing this manager's events. Events are only recorded once somebody observes
    /// them.
    pub fn events(&self) -> EventConsumer {
        self.shared.event_channel.consumer()
    }

    /// Spawn the drain thread and wait until it is running.
    #[tracing::instrument(name = "Manager::start", skip(self), fields(manager = %self.shared.name))]
    pub fn start(&self) -> Result<(), ManagerError> {
        let _lifecycle = self
            .shared
            .lifecycle
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut drain = self.drain.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shared.terminated.load(Ordering::Acquire) {
            return Err(ManagerError::Terminated(self.shared.name.clone()));
        }
        if self.is_alive() || drain.is_some() {
            return Err(ManagerError::AlreadyStarted(self.shared.name.clone()));
        }

        self.shared.running.store(true, Ordering::Release);

        let (ready_tx, ready_rx) = crossbeam::channel::bounded(1);
        let (done_tx, done_rx) = crossbeam::channel::bounded(1);
        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || {
                let _ = ready_tx.send(());
                shared.drain_loop();
                let _ = done_tx.send(());
            })
            .map_err(|err| {
                self.shared.running.store(false, Ordering::Release);
                ManagerError::CouldNotSpawn {
                    name: self.shared.name.clone(),
                    err,
                }
            })?;

        let _ = ready_rx.recv();
        *drain = Some(DrainThread {
            handle,
            done: done_rx,
        });

        self.shared.event_channel.send(ManagerEvent::ManagerStarted {
            manager: self.shared.name.clone(),
        });
        debug!("Manager {} started", self.shared.name);
        Ok(())
    }

    /// Submit a callable under a generated name.
    pub fn submit<T>(&self, callable: Callable<T>) -> Result<TaskHandle<T>, ManagerError>
    where
        T: Send + 'static,
    {
        self.submit_with(None, callable)
    }

    /// Submit a callable under a name of your choosing. The name must not be in use by another
    /// in-flight task.
    pub fn submit_as<T, N>(&self, name: N, callable: Callable<T>) -> Result<TaskHandle<T>, ManagerError>
    where
        T: Send + 'static,
        N: Into<String>,
    {
        self.submit_with(Some(name.into()), callable)
    }

    #[tracing::instrument(name = "Manager::submit", skip(self, callable), fields(manager = %self.shared.name))]
    fn submit_with<T>(
        &self,
        name: Option<String>,
        callable: Callable<T>,
    ) -> Result<TaskHandle<T>, ManagerError>
    where
        T: Send + 'static,
    {
        let shared = &self.shared;
        let _lifecycle = shared
            .lifecycle
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if !self.is_alive() {
            return Err(ManagerError::NotRunning(shared.name.clone()));
        }

        let kind = callable.kind();
        if !shared.mode.accepts(kind) {
            return Err(ManagerError::UnsupportedCallable {
                mode: shared.mode.mode(),
                kind,
            });
        }

        let (task, handle) = loop {
            let explicit = name.is_some();
            let task_name = match &name {
                Some(name) => name.clone(),
                None => shared.mode.task_name(shared.task_seq.next(), &shared.name),
            };
            match shared.tasks.entry(task_name) {
                Entry::Occupied(entry) if explicit => {
                    return Err(ManagerError::DuplicateTaskName(entry.key().clone()))
                }
                Entry::Occupied(_) => continue,
                Entry::Vacant(entry) => {
                    let (task, handle) = Task::new(entry.key().clone(), callable);
                    entry.insert(TaskRecord {
                        completion: task.completion(),
                        submitted_at: Instant::now(),
                    });
                    break (task, handle);
                }
            }
        };

        let task_name = task.name().to_string();
        let completion = task.completion();
        trace!("Queueing task {}", task_name);
        shared.event_channel.send(TaskEvent::TaskSubmitted {
            task: task_name.clone(),
        });
        shared.task_bus.push(task);

        // the task is already on the bus, so a worker closing concurrently sees it too
        if let Err(err) = shared.rescale() {
            error!("Could not grow the pool for task {}: {}", task_name, err);
            completion.reject(TaskError::Shutdown(task_name));
            return Err(err);
        }
        Ok(handle)
    }

    /// Shut the pool down gracefully: in-flight tasks finish, workers are closed and joined,
    /// and tasks nobody picked up are rejected with [TaskError::Shutdown].
    ///
    /// Waits at most `timeout` for all of that to happen.
    ///
    #[tracing::instrument(name = "Manager::stop", skip(self), fields(manager = %self.shared.name))]
    pub fn stop(&self, timeout: Duration) -> Result<(), ManagerError> {
        {
            let _lifecycle = self
                .shared
                .lifecycle
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.shared.running.swap(false, Ordering::AcqRel) {
                return Err(ManagerError::NotRunning(self.shared.name.clone()));
            }
        }

        let drain = self
            .drain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(drain) = drain else {
            return Ok(());
        };

        match drain.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if drain.handle.join().is_err() {
                    warn!("Manager {} drain thread panicked", self.shared.name);
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(ManagerError::ShutdownTimedOut {
                name: self.shared.name.clone(),
                timeout,
            }),
        }
    }

    /// Shut the pool down right away: workers are terminated without being joined and every
    /// task still queued is rejected with [TaskError::Terminated].
    #[tracing::instrument(name = "Manager::terminate", skip(self), fields(manager = %self.shared.name))]
    pub fn terminate(&self) {
        {
            let _lifecycle = self
                .shared
                .lifecycle
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.is_alive() {
                return;
            }
            // the drain thread checks this once it sees the pool stop running
            self.shared.terminated.store(true, Ordering::Release);
            self.shared.running.store(false, Ordering::Release);
        }

        self.drain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        self.shared.abandon();
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        if self.is_alive() {
            if let Err(err) = self.stop(DEFAULT_STOP_TIMEOUT) {
                warn!("{}", err);
            }
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("name", &self.shared.name)
            .field("mode", &self.shared.mode.mode())
            .field("policy", &self.shared.policy)
            .field("running", &self.is_alive())
            .finish()
    }
}

impl Shared {
    fn workers(&self) -> MutexGuard<'_, BTreeMap<String, Worker>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Grow the pool for the tasks waiting on the bus.
    fn rescale(&self) -> Result<(), ManagerError> {
        let mut workers = self.workers();
        let current = workers.len();
        let idle = workers.values().filter(|w| w.is_idle()).count();
        let queued = self.task_bus.len();

        let count = self.policy.workers_to_spawn(current, idle, queued);
        for _ in 0..count {
            let name = self.mode.worker_name(self.worker_seq.next(), &self.name);
            let spec = WorkerSpec::new(
                self.mode.mode(),
                name.clone(),
                self.name.clone(),
                self.config.worker().clone(),
                self.task_bus.clone(),
                self.response_bus.clone(),
            )
            .with_event_channel(self.event_channel.clone());

            let mut worker = Worker::new(spec);
            worker.start()?;
            debug!("Manager {} spawned worker {}", self.name, name);
            workers.insert(name, worker);
        }
        Ok(())
    }

    fn drain_loop(&self) {
        let wait_interval = self.config.wait_interval();
        let limit = self.config.max_processing_responses_per_iteration();

        while self.is_running() {
            let mut processed: u64 = 0;
            while !limit.is_reached(processed) {
                let Some(action) = self.response_bus.try_pop() else {
                    break;
                };
                self.consume(action);
                processed += 1;
            }
            if processed == 0 {
                if let Some(action) = self.response_bus.pop_timeout(wait_interval) {
                    self.consume(action);
                }
            }
        }

        if !self.terminated.load(Ordering::Acquire) {
            self.shutdown();
        }
    }

    #[tracing::instrument(name = "Manager::consume", skip(self), fields(manager = %self.name))]
    fn consume(&self, action: Action) {
        if action.matches(ActionFlag::DONE | ActionFlag::EXCEPTION) {
            match action.task_name() {
                Some(task) => {
                    if let Some((task, record)) = self.tasks.remove(task) {
                        trace!(
                            "Task {} settled after {:?}",
                            task,
                            record.submitted_at.elapsed()
                        );
                    }
                }
                None => warn!("Dropping a task outcome without a task name: {:?}", action),
            }
        }

        if !action.matches(ActionFlag::CLOSE | ActionFlag::RESTART) {
            return;
        }

        let Some(worker_name) = action.worker_name() else {
            warn!("Dropping a lifecycle action without a worker name: {:?}", action);
            return;
        };

        {
            let mut workers = self.workers();
            if action.matches(ActionFlag::RESTART) && self.is_running() {
                if let Some(worker) = workers.get_mut(worker_name) {
                    worker.stop();
                    match worker.start() {
                        Ok(()) => {
                            debug!("Manager {} restarted worker {}", self.name, worker_name);
                            self.event_channel.send(WorkerEvent::WorkerRestarted {
                                manager: self.name.clone(),
                                worker: worker_name.to_string(),
                            });
                        }
                        Err(err) => {
                            error!("Could not restart worker {}: {}", worker_name, err);
                            workers.remove(worker_name);
                        }
                    }
                }
            } else if let Some(mut worker) = workers.remove(worker_name) {
                worker.stop();
                debug!("Manager {} closed worker {}", self.name, worker_name);
                self.event_channel.send(WorkerEvent::WorkerClosed {
                    manager: self.name.clone(),
                    worker: worker_name.to_string(),
                });
            }
        }

        if self.is_running() && !self.task_bus.is_empty() {
            if let Err(err) = self.rescale() {
                error!("Could not grow pool {}: {}", self.name, err);
            }
        }
    }

    /// Wind the pool down after the drain loop exits on a graceful stop.
    #[tracing::instrument(name = "Manager::shutdown", skip(self), fields(manager = %self.name))]
    fn shutdown(&self) {
        for action in self.response_bus.drain() {
            self.consume(action);
        }

        let workers = std::mem::take(&mut *self.workers());
        for worker in workers.values() {
            worker.request(Action::close());
        }
        for (name, mut worker) in workers {
            worker.stop();
            self.event_channel.send(WorkerEvent::WorkerClosed {
                manager: self.name.clone(),
                worker: name,
            });
        }

        for action in self.response_bus.drain() {
            self.consume(action);
        }

        for task in self.task_bus.drain() {
            task.completion()
                .reject(TaskError::Shutdown(task.name().to_string()));
        }
        self.reject_remaining(TaskError::Shutdown);

        self.event_channel.send(ManagerEvent::ManagerStopped {
            manager: self.name.clone(),
        });
        debug!("Manager {} stopped", self.name);
    }

    /// Tear the pool down without waiting for anything.
    fn abandon(&self) {
        let workers = std::mem::take(&mut *self.workers());
        for (_, mut worker) in workers {
            worker.terminate();
        }

        for task in self.task_bus.drain() {
            task.completion()
                .reject(TaskError::Terminated(task.name().to_string()));
        }
        self.tasks.clear();
        self.response_bus.drain();

        self.event_channel.send(ManagerEvent::ManagerStopped {
            manager: self.name.clone(),
        });
        debug!("Manager {} terminated", self.name);
    }

    fn reject_remaining(&self, reason: fn(String) -> TaskError) {
        for entry in self.tasks.iter() {
            if !entry.completion.is_done() {
                entry.completion.reject(reason(entry.key().clone()));
            }
        }
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;

    fn config(num_workers: i64) -> ManagerConfig {
        ManagerConfig::builder()
            .num_workers(num_workers)
            .wait_interval(Duration::from_millis(5))
            .worker(
                WorkerConfig::builder()
                    .wait_interval(Duration::from_millis(5))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn generated_names_follow_the_mode() {
        let manager = Manager::new(config(1));
        assert!(manager.name().starts_with("AsyncManager-"));
        let threaded = Manager::with_mode("thread", config(1)).unwrap();
        assert!(threaded.name().starts_with("ThreadManager-"));
        assert_eq!(threaded.mode(), Mode::Thread);
    }

    #[test]
    fn fixed_names_are_kept() {
        let config = ManagerConfig::builder().name("pool").build().unwrap();
        assert_eq!(Manager::new(config).name(), "pool");
    }

    #[test]
    fn unknown_modes_are_rejected() {
        assert_matches!(
            Manager::with_mode("process", config(1)),
            Err(ManagerError::ConfigError(ConfigError::UnknownMode(_)))
        );
    }

    #[test]
    fn starting_twice_fails() {
        let manager = Manager::new(config(1));
        manager.start().unwrap();
        assert!(manager.is_alive());
        assert_matches!(manager.start(), Err(ManagerError::AlreadyStarted(_)));
        manager.stop(DEFAULT_STOP_TIMEOUT).unwrap();
        assert!(!manager.is_alive());
    }

    #[test]
    fn stopping_a_manager_that_never_started_fails() {
        let manager = Manager::new(config(1));
        assert_matches!(
            manager.stop(DEFAULT_STOP_TIMEOUT),
            Err(ManagerError::NotRunning(_))
        );
    }

    #[test]
    fn workers_are_spawned_on_submit() {
        let manager = Manager::new(config(2));
        manager.start().unwrap();
        assert_eq!(manager.worker_count(), 0);

        let handle = manager
            .submit(Callable::future(|| async { anyhow::Ok(()) }))
            .unwrap();
        assert_eq!(manager.worker_count(), 2);
        handle.wait().unwrap();

        manager.stop(DEFAULT_STOP_TIMEOUT).unwrap();
        assert_eq!(manager.worker_count(), 0);
        assert_eq!(manager.task_count(), 0);
    }

    #[test]
    fn queued_tasks_are_rejected_on_stop() {
        let manager = Manager::new(config(0));
        manager.start().unwrap();
        let handle = manager
            .submit(Callable::future(|| async { anyhow::Ok(()) }))
            .unwrap();
        assert_eq!(manager.queued_count(), 1);

        manager.stop(DEFAULT_STOP_TIMEOUT).unwrap();
        assert_matches!(handle.wait(), Err(TaskError::Shutdown(_)));
    }

    #[test]
    fn queued_tasks_are_rejected_on_terminate() {
        let manager = Manager::new(config(0));
        manager.start().unwrap();
        let handle = manager
            .submit(Callable::future(|| async { anyhow::Ok(()) }))
            .unwrap();

        manager.terminate();
        assert!(!manager.is_alive());
        assert_matches!(handle.wait(), Err(TaskError::Terminated(_)));
        assert_matches!(manager.start(), Err(ManagerError::Terminated(_)));
    }

    #[test]
    fn events_describe_the_pool_lifecycle() {
        let manager = Manager::new(config(1));
        let events = manager.events();
        manager.start().unwrap();
        let handle = manager
            .submit_as("only", Callable::future(|| async { anyhow::Ok(1) }))
            .unwrap();
        handle.wait().unwrap();
        manager.stop(DEFAULT_STOP_TIMEOUT).unwrap();

        let events = events.drain();
        assert_matches!(
            events.first(),
            Some(crate::events::event::Event::ManagerEvent(ManagerEvent::ManagerStarted { .. }))
        );
        assert!(events.contains(
            &TaskEvent::TaskSubmitted {
                task: "only".to_string()
            }
            .into()
        ));
        assert!(events.iter().any(|e| matches!(
            e,
            crate::events::event::Event::TaskEvent(TaskEvent::TaskCompleted { task, .. }) if task == "only"
        )));
        assert_matches!(
            events.last(),
            Some(crate::events::event::Event::ManagerEvent(ManagerEvent::ManagerStopped { .. }))
        );
    }
}
