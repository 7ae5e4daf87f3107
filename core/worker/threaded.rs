//! The threaded worker loop: one task at a time, start to finish.
//!
use super::{WorkerContext, WorkerError};
use crate::model::ActionFlag;
use std::time::Instant;
use tokio::task::LocalSet;
use tracing::*;

/// Entry point of a threaded worker.
///
/// Async callables are driven to completion on a scheduler owned by the thread, so they can be
/// submitted to threaded pools too.
///
#[tracing::instrument(name = "threaded::run", skip(ctx), fields(worker = %ctx.name))]
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

    let wait_interval = ctx.config.wait_interval();
    let idle_timeout = ctx.config.idle_timeout();

    ctx.begin();
    debug!("Worker {} is running", ctx.name);

    let mut idle_since = Instant::now();
    let lifecycle = loop {
        ctx.state.set_idle(true);
        if idle_since.elapsed() > idle_timeout {
            debug!("Worker {} timed out while idle", ctx.name);
            break Some(ctx.lifecycle(ActionFlag::CLOSE));
        }

        if let Some(action) = ctx.drain_requests() {
            break Some(action);
        }

        if !ctx.state.is_running() {
            break None;
        }

        if !ctx.state.is_accepting(&ctx.config) {
            std::thread::sleep(wait_interval);
            continue;
        }

        let Some(task) = ctx.task_bus.pop_timeout(wait_interval) else {
            continue;
        };
        ctx.state.set_idle(false);
        let Some((name, job, _completion)) = ctx.pick_up(task) else {
            continue;
        };

        trace!("Worker {} running task {}", ctx.name, name);
        let outcome = local.block_on(&rt, job.run());
        idle_since = Instant::now();

        if ctx.report(&name, outcome) {
            debug!("Worker {} ran out of budget", ctx.name);
            break Some(ctx.lifecycle(ActionFlag::RESTART));
        }
    };

    ctx.state.set_running(false);
    if let Some(action) = lifecycle {
        ctx.respond(action);
    }
    debug!("Worker {} stopped", ctx.name);
}
