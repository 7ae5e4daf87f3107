//! # Hybrid Pool
//!
//! The flow begins by creating a `ManagerConfig` and using it to build a new `Manager`. Once
//! started, the `Manager` accepts `Callable`s and hands back a `TaskHandle` for each of them,
//! while it grows a pool of `Worker`s that pull tasks off a shared bus and report back how they
//! went.
//!
//! Workers run in one of the registered `modes`: cooperatively, with many tasks interleaving on
//! a single-threaded scheduler per worker, or one task at a time on a plain thread.
//!
pub mod bus;
pub mod config;
pub mod events;
pub mod manager;
pub mod model;
pub mod modes;
pub(crate) mod sync;
pub mod util;
pub mod worker;

pub use config::*;
pub use manager::*;
pub use model::{Action, ActionFlag, Callable, CallableKind, TaskError, TaskHandle};
pub use modes::Mode;
pub use util::Limit;
pub use worker::{WorkerError, WorkerStats};

#[macro_use]
extern crate derive_builder;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;
