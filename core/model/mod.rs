mod action;
mod callable;
mod error;
mod handle;
mod task;

pub use action::*;
pub use callable::*;
pub use error::*;
pub use handle::TaskHandle;
pub(crate) use handle::{Completion, Slot};
pub(crate) use task::Job;
pub use task::{Outcome, Task};
