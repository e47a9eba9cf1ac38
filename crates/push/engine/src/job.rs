//! Units of work flowing through the queue.

use std::sync::Arc;

use push_core::{Outcome, Priority};
use tokio::sync::mpsc;
use uuid::Uuid;

/// One provider request: a rendered payload and the devices it targets.
#[derive(Debug)]
pub struct Job<P> {
    /// Correlates every job of the same message in logs.
    pub message_id: Uuid,
    /// Devices covered by this request, in submission order.
    pub devices: Vec<String>,
    /// Payload rendered once per message and shared by its jobs.
    pub payload: Arc<P>,
    pub priority: Priority,
    /// Time to live in seconds.
    pub expiration: u64,
}

/// Outcomes of one job, aligned with its devices.
#[derive(Debug)]
pub(crate) struct JobReport {
    pub devices: Vec<String>,
    pub outcomes: Vec<Outcome>,
}

/// A queued job plus the completion channel of its message.
pub(crate) struct Envelope<P> {
    pub job: Job<P>,
    pub reply: mpsc::Sender<JobReport>,
}
