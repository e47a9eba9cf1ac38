//! Push Dispatch Engine
//!
//! Fans one logical message out to device jobs, drains them through a fixed
//! worker pool and folds the per-device outcomes back into one response.

mod aggregator;
mod credential;
mod dispatcher;
mod job;
mod pool;
mod queue;
mod traits;

pub use aggregator::Listener;
pub use credential::*;
pub use dispatcher::Dispatcher;
pub use job::Job;
pub use queue::{Consumer, WorkQueue};
pub use traits::*;
