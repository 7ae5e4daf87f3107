use crate::config::WorkerConfig;
use crate::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The flags and counters of a worker, shared between its handle and its thread.
///
/// Counters are only ever written by the worker thread (or by the handle while the thread is
/// not running), so relaxed ordering is enough for them. The flags synchronize the two sides.
///
#[derive(Debug, Default)]
pub(crate) struct WorkerState {
    running: AtomicBool,
    idle: AtomicBool,
    terminated: AtomicBool,

    task_count: AtomicU64,
    err_count: AtomicU64,
    cons_err_count: AtomicU64,
}

impl WorkerState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bring everything back to how a brand new worker looks.
    pub(crate) fn reset(&self) {
        self.running.store(false, Ordering::Release);
        self.idle.store(false, Ordering::Release);
        self.terminated.store(false, Ordering::Release);
        self.reset_counters();
    }

    pub(crate) fn reset_counters(&self) {
        self.task_count.store(0, Ordering::Relaxed);
        self.err_count.store(0, Ordering::Relaxed);
        self.cons_err_count.store(0, Ordering::Relaxed);
    }

    /// Mark the worker as running and idle.
    pub(crate) fn begin(&self) {
        self.running.store(true, Ordering::Release);
        self.idle.store(true, Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release)
    }

    /// Idle only counts for running workers.
    pub(crate) fn is_idle(&self) -> bool {
        self.is_running() && self.idle.load(Ordering::Acquire)
    }

    pub(crate) fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::Release)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn task_count(&self) -> u64 {
        self.task_count.load(Ordering::Relaxed)
    }

    pub(crate) fn err_count(&self) -> u64 {
        self.err_count.load(Ordering::Relaxed)
    }

    pub(crate) fn cons_err_count(&self) -> u64 {
        self.cons_err_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_accepted(&self) {
        self.task_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.cons_err_count.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.err_count.fetch_add(1, Ordering::Relaxed);
        self.cons_err_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether the worker may still take on new tasks.
    pub(crate) fn is_accepting(&self, config: &WorkerConfig) -> bool {
        !config.max_task_count().is_reached(self.task_count())
    }

    /// Whether any of the budgets in `config` has run out.
    pub(crate) fn is_exhausted(&self, config: &WorkerConfig) -> bool {
        config.max_task_count().is_reached(self.task_count())
            || config.max_err_count().is_reached(self.err_count())
            || config.max_cons_err_count().is_reached(self.cons_err_count())
    }
}
