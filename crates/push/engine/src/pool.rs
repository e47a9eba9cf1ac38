//! Fixed-size sender pool draining the work queue.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::Provider;
use crate::job::{Envelope, JobReport};
use crate::queue::Consumer;

/// Spawn `count` workers (at least one) sending through `provider`.
pub(crate) fn spawn_workers<P>(
    count: usize,
    provider: Arc<P>,
    consumer: Consumer<Envelope<P::Payload>>,
) -> Vec<JoinHandle<()>>
where
    P: Provider + 'static,
{
    (0..count.max(1))
        .map(|worker| {
            tokio::spawn(run_worker(
                worker,
                Arc::clone(&provider),
                consumer.clone(),
            ))
        })
        .collect()
}

async fn run_worker<P: Provider>(
    worker: usize,
    provider: Arc<P>,
    consumer: Consumer<Envelope<P::Payload>>,
) {
    while let Some(Envelope { job, reply }) = consumer.pop().await {
        let outcomes = if job.devices.is_empty() {
            Vec::new()
        } else {
            match provider.send(&job).await {
                Ok(outcomes) if outcomes.len() == job.devices.len() => outcomes,
                Ok(outcomes) => {
                    tracing::error!(
                        provider = provider.name(),
                        worker,
                        message_id = %job.message_id,
                        devices = job.devices.len(),
                        outcomes = outcomes.len(),
                        "outcome count does not match job, dropping job"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        provider = provider.name(),
                        worker,
                        message_id = %job.message_id,
                        devices = job.devices.len(),
                        error = %e,
                        "send failed, dropping job"
                    );
                    continue;
                }
            }
        };

        let report = JobReport {
            devices: job.devices,
            outcomes,
        };
        if reply.send(report).await.is_err() {
            tracing::warn!(
                worker,
                message_id = %job.message_id,
                "aggregation gone, discarding outcomes"
            );
        }
    }

    tracing::debug!(provider = provider.name(), worker, "work queue closed, worker exiting");
}
