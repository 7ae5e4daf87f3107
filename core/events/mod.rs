//! # Pool lifecycle events
//!
//! Managers and workers report what they are doing on an [EventChannel]. Events only carry
//! names and messages, never references into the pool, so observers can hold on to them for as
//! long as they like.
//!
mod channel;
mod consumer;
pub mod event;

pub use channel::*;
pub use consumer::*;
