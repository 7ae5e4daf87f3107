//! The cooperative worker loop: many tasks interleave on one single-threaded scheduler.
//!
use super::{WorkerContext, WorkerError};
use crate::model::{Action, ActionFlag, Completion, Outcome};
use crate::sync::Arc;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, LocalSet};
use tracing::*;

struct InFlight {
    handle: JoinHandle<()>,
    completion: Arc<dyn Completion>,
}

struct Finished {
    task: String,
    outcome: Outcome,
}

/// Entry point of an async worker thread.
pub(crate) fn run(ctx: WorkerContext) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            let name = ctx.name.clone();
            return ctx.fail_to_begin(WorkerError::CouldNotBuildRuntime { name, err });
        }
    };
    let local = LocalSet::new();
    local.block_on(&rt, CooperativeLoop::new(ctx).run());
}

struct CooperativeLoop {
    ctx: WorkerContext,
    wait_interval: Duration,
    idle_timeout: Duration,
    in_flight: HashMap<String, InFlight>,
    done_tx: UnboundedSender<Finished>,
    done_rx: UnboundedReceiver<Finished>,
}

impl CooperativeLoop {
    fn new(ctx: WorkerContext) -> Self {
        let (done_tx, done_rx) = unbounded_channel();
        Self {
            wait_interval: ctx.config.wait_interval(),
            idle_timeout: ctx.config.idle_timeout(),
            ctx,
            in_flight: HashMap::new(),
            done_tx,
            done_rx,
        }
    }

    #[tracing::instrument(name = "CooperativeLoop::run", skip(self), fields(worker = %self.ctx.name))]
    async fn run(mut self) {
        self.ctx.begin();
        debug!("Worker {} is running", self.ctx.name);

        let mut idle_since = Instant::now();
        let lifecycle = loop {
            if self.in_flight.is_empty() {
                self.ctx.state.set_idle(true);
                if idle_since.elapsed() > self.idle_timeout {
                    debug!("Worker {} timed out while idle", self.ctx.name);
                    break Some(self.ctx.lifecycle(ActionFlag::CLOSE));
                }
            } else {
                self.ctx.state.set_idle(false);
                idle_since = Instant::now();
            }

            if let Some(action) = self.ctx.drain_requests() {
                break Some(action);
            }

            if !self.ctx.state.is_running() {
                break None;
            }

            self.accept();

            if self.collect().await {
                debug!("Worker {} ran out of budget", self.ctx.name);
                break Some(self.ctx.lifecycle(ActionFlag::RESTART));
            }
        };

        self.wind_down(lifecycle).await;
    }

    /// Pull tasks off the bus and schedule them. Only waits for a task when there is nothing
    /// else to make progress on.
    fn accept(&mut self) {
        while self.ctx.state.is_running() && self.ctx.state.is_accepting(&self.ctx.config) {
            let next = if self.in_flight.is_empty() {
                self.ctx.task_bus.pop_timeout(self.wait_interval)
            } else {
                self.ctx.task_bus.try_pop()
            };
            let Some(task) = next else { break };
            let Some((name, job, completion)) = self.ctx.pick_up(task) else {
                continue;
            };

            trace!("Worker {} accepted task {}", self.ctx.name, name);
            let done = self.done_tx.clone();
            let task = name.clone();
            let handle = tokio::task::spawn_local(async move {
                let outcome = job.run().await;
                let _ = done.send(Finished { task, outcome });
            });
            self.in_flight.insert(name, InFlight { handle, completion });
            self.ctx.state.set_idle(false);
        }
    }

    /// Wait a little for in-flight tasks to finish and report every one that did. Returns true
    /// when a budget ran out.
    async fn collect(&mut self) -> bool {
        if self.in_flight.is_empty() {
            if !self.ctx.state.is_accepting(&self.ctx.config) {
                tokio::time::sleep(self.wait_interval).await;
            }
            return false;
        }

        let mut exhausted = false;
        if let Ok(Some(finished)) =
            tokio::time::timeout(self.wait_interval, self.done_rx.recv()).await
        {
            exhausted |= self.complete(finished);
        }
        while let Ok(finished) = self.done_rx.try_recv() {
            exhausted |= self.complete(finished);
        }
        exhausted
    }

    fn complete(&mut self, finished: Finished) -> bool {
        self.in_flight.remove(&finished.task);
        self.ctx.report(&finished.task, finished.outcome)
    }

    /// Let in-flight tasks finish (or abandon them if terminated), flush their outcomes and
    /// post the lifecycle action last.
    async fn wind_down(mut self, lifecycle: Option<Action>) {
        self.ctx.state.set_running(false);

        while !self.in_flight.is_empty() {
            if self.ctx.state.is_terminated() {
                for (task, in_flight) in self.in_flight.drain() {
                    in_flight.handle.abort();
                    self.ctx.abandon(&task, in_flight.completion.as_ref());
                }
                break;
            }
            if let Ok(Some(finished)) =
                tokio::time::timeout(self.wait_interval, self.done_rx.recv()).await
            {
                self.complete(finished);
            }
        }

        if let Some(action) = lifecycle {
            self.ctx.respond(action);
        }
        self.ctx.state.set_idle(true);
        debug!("Worker {} stopped", self.ctx.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::config::WorkerConfig;
    use crate::events::EventChannel;
    use crate::model::{Callable, Task, TaskError, TaskHandle};
    use crate::worker::WorkerState;

    struct Harness {
        task_bus: Bus<Task>,
        request_bus: Bus<Action>,
        response_bus: Bus<Action>,
        state: Arc<WorkerState>,
        thread: std::thread::JoinHandle<()>,
    }

    fn spawn(config: WorkerConfig) -> Harness {
        let task_bus = Bus::new();
        let request_bus = Bus::new();
        let response_bus = Bus::new();
        let state = Arc::new(WorkerState::new());
        let (ready_tx, ready_rx) = crossbeam::channel::bounded(1);
        let ctx = WorkerContext::new(
            "coop".to_string(),
            config,
            task_bus.clone(),
            request_bus.clone(),
            response_bus.clone(),
            state.clone(),
            Arc::new(EventChannel::new()),
            ready_tx,
        );
        let thread = std::thread::spawn(move || run(ctx));
        ready_rx.recv().unwrap().unwrap();
        Harness {
            task_bus,
            request_bus,
            response_bus,
            state,
            thread,
        }
    }

    fn fast() -> WorkerConfig {
        WorkerConfig::builder()
            .wait_interval(Duration::from_millis(5))
            .build()
            .unwrap()
    }

    fn submit<T: Send + 'static>(bus: &Bus<Task>, name: &str, callable: Callable<T>) -> TaskHandle<T> {
        let (task, handle) = Task::new(name.to_string(), callable);
        bus.push(task);
        handle
    }

    #[test]
    fn tasks_interleave_on_one_worker() {
        let h = spawn(fast());
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();

        // the waiter can only finish if the sender gets to run while it is suspended
        let waiter = submit(
            &h.task_bus,
            "waiter",
            Callable::future(move || async move { anyhow::Ok(rx.await? + 1) }),
        );
        let sender = submit(
            &h.task_bus,
            "sender",
            Callable::future(move || async move {
                tx.send(41).map_err(|_| anyhow::anyhow!("waiter is gone"))?;
                anyhow::Ok(())
            }),
        );

        assert_eq!(waiter.wait().unwrap(), 42);
        sender.wait().unwrap();

        h.state.set_running(false);
        h.thread.join().unwrap();
        assert_eq!(h.state.task_count(), 2);
    }

    #[test]
    fn accepting_a_task_clears_idle_right_away() {
        // a long wait interval, so only acceptance itself can clear the flag in time
        let config = WorkerConfig::builder()
            .wait_interval(Duration::from_millis(300))
            .build()
            .unwrap();
        let h = spawn(config);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let pending = submit(
            &h.task_bus,
            "pending",
            Callable::future(move || async move {
                rx.await?;
                anyhow::Ok(())
            }),
        );

        let deadline = Instant::now() + Duration::from_millis(100);
        while h.state.task_count() == 0 || h.state.is_idle() {
            assert!(
                Instant::now() < deadline,
                "worker still idle with a task in flight"
            );
            std::thread::sleep(Duration::from_millis(1));
        }

        tx.send(()).unwrap();
        pending.wait().unwrap();
        h.state.set_running(false);
        h.thread.join().unwrap();
    }

    #[test]
    fn close_requests_wind_down_after_in_flight_tasks() {
        let h = spawn(fast());
        let slow = submit(
            &h.task_bus,
            "slow",
            Callable::future(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                anyhow::Ok("done")
            }),
        );
        while h.state.task_count() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        h.request_bus.push(Action::close());
        h.thread.join().unwrap();

        assert_eq!(slow.wait().unwrap(), "done");
        let outcome = h.response_bus.try_pop().unwrap();
        assert!(outcome.matches(ActionFlag::DONE));
        let last = h.response_bus.try_pop().unwrap();
        assert_eq!(last.flag(), ActionFlag::CLOSE);
        assert_eq!(last.worker_name(), Some("coop"));
    }

    #[test]
    fn terminating_abandons_in_flight_tasks() {
        let h = spawn(fast());
        let stuck = submit(
            &h.task_bus,
            "stuck",
            Callable::future(|| async {
                futures::future::pending::<()>().await;
                anyhow::Ok(())
            }),
        );
        while h.state.task_count() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        h.state.terminate();
        h.thread.join().unwrap();
        assert_matches!(stuck.wait(), Err(TaskError::Terminated(name)) if name == "stuck");
    }

    #[test]
    fn idle_workers_close_themselves() {
        let config = WorkerConfig::builder()
            .wait_interval(Duration::from_millis(5))
            .idle_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let h = spawn(config);
        h.thread.join().unwrap();
        let last = h.response_bus.try_pop().unwrap();
        assert_eq!(last.flag(), ActionFlag::CLOSE);
        assert!(!h.state.is_running());
    }
}
