use hybrid_pool_core::events::event::*;
use hybrid_pool_core::events::EventConsumer;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

trait Reporter {
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Noop => (),
            Event::ManagerEvent(e) => self.on_manager_event(e),
            Event::TaskEvent(e) => self.on_task_event(e),
            Event::WorkerEvent(e) => self.on_worker_event(e),
        }
    }

    fn on_manager_event(&mut self, _event: ManagerEvent) {}
    fn on_task_event(&mut self, _event: TaskEvent) {}
    fn on_worker_event(&mut self, _event: WorkerEvent) {}
}

/// What a run looked like from the outside, once the pool stopped.
#[derive(Default, Debug, Clone)]
pub struct Summary {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub workers_started: u64,
    pub workers_restarted: u64,
    pub workers_closed: u64,
    pub elapsed: Duration,
}

impl Summary {
    pub fn print(&self) {
        let green_bold = console::Style::new().green().bold();
        let red_bold = console::Style::new().red().bold();
        let blue_dim = console::Style::new().blue();

        println!(
            "{:>12} {} tasks in {:.3}s",
            green_bold.apply_to("Finished"),
            self.submitted,
            self.elapsed.as_secs_f64()
        );
        println!(
            "{:>12} {} completed, {} failed, {} cancelled",
            if self.failed > 0 {
                red_bold.apply_to("Tasks")
            } else {
                green_bold.apply_to("Tasks")
            },
            self.completed,
            self.failed,
            self.cancelled
        );
        println!(
            "{:>12} {} started, {} restarted, {} closed",
            blue_dim.apply_to("Workers"),
            self.workers_started,
            self.workers_restarted,
            self.workers_closed
        );
    }
}

/// Renders pool events as a progress bar until the manager stops.
pub struct StatusReporter {
    should_stop: bool,
    started: Instant,
    event_consumer: EventConsumer,
    active_workers: BTreeSet<String>,
    summary: Summary,
    pb: ProgressBar,
}

impl StatusReporter {
    pub fn new(event_consumer: EventConsumer, total: u64) -> StatusReporter {
        let style = ProgressStyle::default_bar()
            .template("{prefix:>12.cyan.bold} [{bar:25}] {pos}/{len} {wide_msg}")
            .progress_chars("=> ");

        let pb = ProgressBar::new(total);
        pb.set_style(style);
        pb.set_prefix("Running");

        StatusReporter {
            should_stop: false,
            started: Instant::now(),
            event_consumer,
            active_workers: BTreeSet::default(),
            summary: Summary::default(),
            pb,
        }
    }

    /// Consume events on a thread of their own. The summary is handed back once the manager
    /// reports that it stopped.
    pub fn spawn(mut self) -> JoinHandle<Summary> {
        std::thread::spawn(move || {
            loop {
                self.event_consumer.fetch();
                match self.event_consumer.pop() {
                    Some(event) => {
                        debug!("{:?}", event);
                        self.handle_event(event)
                    }
                    None => std::thread::sleep(Duration::from_micros(100)),
                }
                if self.should_stop {
                    break;
                }
            }
            self.pb.finish_and_clear();
            self.summary.elapsed = self.started.elapsed();
            self.summary
        })
    }

    fn update_message(&self) {
        self.pb.set_message(format!(
            " {} workers active",
            self.active_workers.len()
        ));
    }
}

impl Reporter for StatusReporter {
    fn on_manager_event(&mut self, event: ManagerEvent) {
        if let ManagerEvent::ManagerStopped { .. } = event {
            self.should_stop = true;
        }
    }

    fn on_task_event(&mut self, event: TaskEvent) {
        let red_bold = console::Style::new().red().bold();
        let yellow = console::Style::new().yellow();

        match event {
            TaskEvent::TaskSubmitted { .. } => self.summary.submitted += 1,
            TaskEvent::TaskCompleted { worker, .. } => {
                self.summary.completed += 1;
                self.active_workers.insert(worker);
                self.pb.inc(1);
            }
            TaskEvent::TaskFailed {
                task,
                worker,
                error,
            } => {
                self.summary.failed += 1;
                self.active_workers.insert(worker);
                self.pb
                    .println(format!("{:>12} {} ({})", red_bold.apply_to("FAILED"), task, error));
                self.pb.inc(1);
            }
            TaskEvent::TaskCancelled { task } => {
                self.summary.cancelled += 1;
                self.pb
                    .println(format!("{:>12} {}", yellow.apply_to("Cancelled"), task));
                self.pb.inc(1);
            }
        }
        self.update_message();
    }

    fn on_worker_event(&mut self, event: WorkerEvent) {
        let purple = console::Style::new().magenta().bright();
        let blue_dim = console::Style::new().blue();

        match event {
            WorkerEvent::WorkerStarted { worker, .. } => {
                self.summary.workers_started += 1;
                self.pb
                    .println(format!("{:>12} {}", blue_dim.apply_to("Started"), worker));
            }
            WorkerEvent::WorkerRestarted { worker, .. } => {
                self.summary.workers_restarted += 1;
                self.active_workers.remove(&worker);
                self.pb
                    .println(format!("{:>12} {}", purple.apply_to("Restarted"), worker));
            }
            WorkerEvent::WorkerClosed { worker, .. } => {
                self.summary.workers_closed += 1;
                self.active_workers.remove(&worker);
                self.pb
                    .println(format!("{:>12} {}", blue_dim.apply_to("Closed"), worker));
            }
        }
        self.update_message();
    }
}
