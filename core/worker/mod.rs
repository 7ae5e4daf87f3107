//! # Workers
//!
//! A worker owns one OS thread. It pulls tasks off the task bus its manager shares with every
//! worker in the pool, runs them according to the pool's [Mode], and reports each outcome on the
//! response bus. It keeps its own task and error counters, and asks to be restarted when one of
//! its budgets runs out.
//!
//! Workers only know their manager by name: they never touch the manager's registries.
//!
mod context;
pub(crate) mod cooperative;
mod error;
mod state;
pub(crate) mod threaded;

pub(crate) use context::*;
pub use error::*;
pub(crate) use state::*;

use crate::bus::Bus;
use crate::config::WorkerConfig;
use crate::events::event::WorkerEvent;
use crate::events::EventChannel;
use crate::model::{Action, Task};
use crate::modes::Mode;
use crate::sync::Arc;
use std::thread::JoinHandle;
use tracing::*;

/// What a worker is made of. Restarting a worker reuses the same spec.
///
#[derive(Clone, Debug)]
pub struct WorkerSpec {
    mode: Mode,
    name: String,
    manager: String,
    config: WorkerConfig,
    task_bus: Bus<Task>,
    response_bus: Bus<Action>,
    event_channel: Arc<EventChannel>,
}

impl WorkerSpec {
    pub fn new(
        mode: Mode,
        name: String,
        manager: String,
        config: WorkerConfig,
        task_bus: Bus<Task>,
        response_bus: Bus<Action>,
    ) -> Self {
        Self {
            mode,
            name,
            manager,
            config,
            task_bus,
            response_bus,
            event_channel: Arc::new(EventChannel::new()),
        }
    }

    pub fn with_event_channel(mut self, event_channel: Arc<EventChannel>) -> Self {
        self.event_channel = event_channel;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }
}

/// A point-in-time view of a worker.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerStats {
    pub name: String,
    pub task_count: u64,
    pub err_count: u64,
    pub cons_err_count: u64,
    pub is_alive: bool,
    pub is_idle: bool,
}

pub struct Worker {
    spec: WorkerSpec,
    request_bus: Bus<Action>,
    state: Arc<WorkerState>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(spec: WorkerSpec) -> Self {
        Self {
            spec,
            request_bus: Bus::new(),
            state: Arc::new(WorkerState::new()),
            thread: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Spawn the worker thread and wait until it is running.
    ///
    /// Stopped workers can be started again: they come back with the same name and fresh
    /// counters.
    ///
    #[tracing::instrument(name = "Worker::start", skip(self), fields(worker = %self.spec.name))]
    pub fn start(&mut self) -> Result<(), WorkerError> {
        if self.thread.is_some() {
            return Err(WorkerError::AlreadyStarted(self.spec.name.clone()));
        }

        self.state.reset();
        let stale = self.request_bus.drain();
        if !stale.is_empty() {
            debug!("Dropping {} stale requests", stale.len());
        }

        let (ready_tx, ready_rx) = crossbeam::channel::bounded(1);
        let ctx = WorkerContext::new(
            self.spec.name.clone(),
            self.spec.config.clone(),
            self.spec.task_bus.clone(),
            self.request_bus.clone(),
            self.spec.response_bus.clone(),
            self.state.clone(),
            self.spec.event_channel.clone(),
            ready_tx,
        );
        let runner = self.spec.mode.spec().runner;

        let thread = std::thread::Builder::new()
            .name(self.spec.name.clone())
            .spawn(move || runner(ctx))
            .map_err(|err| WorkerError::CouldNotSpawn {
                name: self.spec.name.clone(),
                err,
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.thread = Some(thread);
                self.spec.event_channel.send(WorkerEvent::WorkerStarted {
                    manager: self.spec.manager.clone(),
                    worker: self.spec.name.clone(),
                });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(WorkerError::ExitedBeforeReady(self.spec.name.clone()))
            }
        }
    }

    /// Stop taking new tasks, let in-flight ones finish, and join the thread.
    #[tracing::instrument(name = "Worker::stop", skip(self), fields(worker = %self.spec.name))]
    pub fn stop(&mut self) {
        self.state.set_running(false);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Worker {} panicked while stopping", self.spec.name);
            }
        }
    }

    /// Abandon in-flight tasks and detach the thread without waiting for it.
    #[tracing::instrument(name = "Worker::terminate", skip(self), fields(worker = %self.spec.name))]
    pub fn terminate(&mut self) {
        self.state.terminate();
        self.thread.take();
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_running()
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// Post an action on this worker's private request bus.
    pub fn request(&self, action: Action) {
        self.request_bus.push(action)
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            name: self.spec.name.clone(),
            task_count: self.state.task_count(),
            err_count: self.state.err_count(),
            cons_err_count: self.state.cons_err_count(),
            is_alive: self.is_alive(),
            is_idle: self.is_idle(),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if self.spec.config.daemon() {
                self.terminate()
            } else {
                self.stop()
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.spec.name)
            .field("mode", &self.spec.mode)
            .field("stats", &self.stats())
            .finish()
    }
}
