//! Per-message response aggregation.

use std::sync::Arc;

use push_core::Response;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::job::JobReport;

/// Read side of the completed-response stream.
///
/// Clones share one channel, so each response is observed by exactly one
/// listener.
#[derive(Clone)]
pub struct Listener {
    receiver: Arc<Mutex<mpsc::Receiver<Response>>>,
}

impl Listener {
    pub(crate) fn new(receiver: mpsc::Receiver<Response>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Next completed response.
    ///
    /// Returns `None` once the dispatcher is dropped and every in-flight
    /// message has finished.
    pub async fn recv(&self) -> Option<Response> {
        self.receiver.lock().await.recv().await
    }
}

/// Running aggregate for one message.
pub(crate) struct Aggregation {
    message_id: Uuid,
    expected: usize,
    completed: usize,
    response: Response,
}

impl Aggregation {
    pub fn new(message_id: Uuid, expected: usize, response: Response) -> Self {
        Self {
            message_id,
            expected,
            completed: 0,
            response,
        }
    }

    fn is_complete(&self) -> bool {
        self.completed >= self.expected
    }

    /// Fold one job report into the response.
    fn apply(&mut self, report: JobReport) {
        for (device, outcome) in report.devices.iter().zip(report.outcomes) {
            self.response.record(device, outcome);
        }
        self.completed += 1;
    }

    /// Collect job reports until every job has reported, then publish.
    ///
    /// Jobs dropped on transport errors never report; once all remaining
    /// senders are gone the aggregation ends without publishing.
    pub async fn run(
        mut self,
        mut reports: mpsc::Receiver<JobReport>,
        responses: mpsc::Sender<Response>,
    ) {
        while !self.is_complete() {
            match reports.recv().await {
                Some(report) => self.apply(report),
                None => {
                    tracing::warn!(
                        message_id = %self.message_id,
                        completed = self.completed,
                        expected = self.expected,
                        "jobs dropped before completion, no response emitted"
                    );
                    return;
                }
            }
        }

        tracing::debug!(
            message_id = %self.message_id,
            success = self.response.success,
            failure = self.response.failure,
            total = self.response.total,
            "message complete"
        );

        if responses.send(self.response).await.is_err() {
            tracing::warn!(message_id = %self.message_id, "response listener closed");
        }
    }
}
