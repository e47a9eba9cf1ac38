//! Generic dispatch engine behind every provider.

use std::sync::Arc;

use push_core::config::EngineConfig;
use push_core::{Message, Response, batches};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::aggregator::{Aggregation, Listener};
use crate::job::{Envelope, Job};
use crate::queue::WorkQueue;
use crate::{Provider, Pusher, pool};

/// Queue-backed pusher for one provider instance.
///
/// Dropping the dispatcher closes the work queue: workers drain what is
/// already queued and exit, and listeners see the end of the stream once the
/// last in-flight message completes.
pub struct Dispatcher<P: Provider> {
    provider: Arc<P>,
    queue: WorkQueue<Envelope<P::Payload>>,
    responses: mpsc::Sender<Response>,
    listener: Listener,
}

impl<P> Dispatcher<P>
where
    P: Provider + 'static,
{
    /// Start the sender pool. Must be called inside a tokio runtime.
    pub fn new(provider: P, config: &EngineConfig) -> Self {
        let provider = Arc::new(provider);
        let queue = WorkQueue::new(config.queue_capacity);
        let (responses, receiver) = mpsc::channel(config.response_buffer.max(1));

        pool::spawn_workers(config.sender_count, Arc::clone(&provider), queue.consumer());

        tracing::info!(
            provider = provider.name(),
            workers = config.sender_count.max(1),
            queue_capacity = config.queue_capacity,
            "dispatcher started"
        );

        Self {
            provider,
            queue,
            responses,
            listener: Listener::new(receiver),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Jobs waiting for a worker.
    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    async fn dispatch(&self, message: Message) {
        let message_id = Uuid::new_v4();

        let payload = match self.provider.render(&message) {
            Ok(payload) => Arc::new(payload),
            Err(e) => {
                tracing::error!(
                    provider = self.provider.name(),
                    %message_id,
                    error = %e,
                    "cannot render payload, dropping message"
                );
                return;
            }
        };

        let Message {
            devices,
            priority,
            expiration,
            extra,
            ..
        } = message;

        let jobs: Vec<Job<P::Payload>> = batches(&devices, self.provider.batch_size())
            .into_iter()
            .map(|batch| Job {
                message_id,
                devices: batch.to_vec(),
                payload: Arc::clone(&payload),
                priority,
                expiration,
            })
            .collect();

        tracing::debug!(
            provider = self.provider.name(),
            %message_id,
            devices = devices.len(),
            jobs = jobs.len(),
            "queueing message"
        );

        let (reply, reports) = mpsc::channel(jobs.len().max(1));
        let aggregation = Aggregation::new(message_id, jobs.len(), Response::new(extra));
        tokio::spawn(aggregation.run(reports, self.responses.clone()));

        for job in jobs {
            let envelope = Envelope {
                job,
                reply: reply.clone(),
            };
            if self.queue.push(envelope).await.is_err() {
                tracing::error!(%message_id, "work queue closed, dropping job");
            }
        }
    }
}

impl<P> Pusher for Dispatcher<P>
where
    P: Provider + 'static,
{
    async fn queue(&self, message: Message) {
        self.dispatch(message).await;
    }

    fn listen(&self) -> Listener {
        self.listener.clone()
    }
}
