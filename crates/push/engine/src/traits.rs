//! Push notification traits.

use push_core::{Message, Outcome};

use crate::{Job, Listener};

/// Provider-agnostic push front end.
#[trait_variant::make(Send)]
pub trait Pusher: Send + Sync {
    /// Accept a message for asynchronous delivery.
    ///
    /// Waits only while the work queue is full. Delivery results arrive on
    /// [`Pusher::listen`]; a message whose payload cannot be rendered is
    /// logged and dropped.
    async fn queue(&self, message: Message);

    /// Stream of completed responses, in completion order.
    fn listen(&self) -> Listener;
}

/// Low-level delivery capability for one provider.
#[trait_variant::make(Send)]
pub trait Provider: Send + Sync {
    /// Payload rendered once per message and shared by its jobs.
    type Payload: Send + Sync + 'static;

    /// Provider name used in logs.
    fn name(&self) -> &'static str;

    /// Maximum devices per request; `1` fans out per device.
    fn batch_size(&self) -> usize;

    /// Render the provider payload for a message.
    fn render(&self, message: &Message) -> color_eyre::eyre::Result<Self::Payload>;

    /// Send one job, retrying internally.
    ///
    /// Returns one outcome per device of the job, in the job's device order.
    /// An error means the request never reached a terminal classification.
    async fn send(&self, job: &Job<Self::Payload>) -> color_eyre::eyre::Result<Vec<Outcome>>;
}
