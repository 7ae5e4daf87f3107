#![allow(dead_code)]

use hybrid_pool_core::events::event::{Event, WorkerEvent};
use hybrid_pool_core::events::EventConsumer;
use hybrid_pool_core::{ManagerConfig, Mode, WorkerConfig};
use std::time::{Duration, Instant};

pub const PATIENCE: Duration = Duration::from_secs(10);

/// Poll `check` until it holds or `PATIENCE` runs out.
pub fn wait_until<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    check()
}

/// Print library logs while testing when `HPX_TEST_LOG` is set, e.g. `HPX_TEST_LOG=debug`.
pub fn init_tracing() {
    let Ok(level) = std::env::var("HPX_TEST_LOG") else {
        return;
    };
    let level = level.parse().unwrap_or(tracing::Level::DEBUG);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_test_writer()
        .try_init();
}

/// A pool config that reacts quickly, so tests do not sit around waiting.
pub fn fast_config(mode: Mode, num_workers: i64, worker: WorkerConfig) -> ManagerConfig {
    init_tracing();
    ManagerConfig::builder()
        .mode(mode)
        .num_workers(num_workers)
        .wait_interval(Duration::from_millis(5))
        .worker(worker)
        .build()
        .unwrap()
}

pub fn fast_worker() -> hybrid_pool_core::WorkerConfigBuilder {
    let mut builder = WorkerConfig::builder();
    builder.wait_interval(Duration::from_millis(5));
    builder
}

/// Keeps every event seen so far, since consumers hand each event out only once.
pub struct EventLog {
    consumer: EventConsumer,
    seen: Vec<Event>,
}

impl EventLog {
    pub fn new(consumer: EventConsumer) -> Self {
        Self {
            consumer,
            seen: vec![],
        }
    }

    pub fn events(&mut self) -> &[Event] {
        let new = self.consumer.drain();
        self.seen.extend(new);
        &self.seen
    }

    pub fn restarts(&mut self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                Event::WorkerEvent(WorkerEvent::WorkerRestarted { worker, .. }) => {
                    Some(worker.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn closes(&mut self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                Event::WorkerEvent(WorkerEvent::WorkerClosed { worker, .. }) => {
                    Some(worker.clone())
                }
                _ => None,
            })
            .collect()
    }
}
