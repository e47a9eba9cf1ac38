//! Bounded multi-consumer work queue.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

/// Bounded FIFO shared by every producer of a dispatcher.
///
/// Workers consume through [`Consumer`] handles; the queue closes once the
/// `WorkQueue` is dropped and its buffer is drained.
pub struct WorkQueue<T> {
    sender: mpsc::Sender<T>,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
}

/// Consuming side of a [`WorkQueue`], cheap to clone into workers.
pub struct Consumer<T> {
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: Arc::clone(&self.receiver),
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Enqueue an item, waiting while the queue is full.
    ///
    /// Returns the item back if every consumer is gone.
    pub async fn push(&self, item: T) -> Result<(), T> {
        self.sender.send(item).await.map_err(|e| e.0)
    }

    pub fn consumer(&self) -> Consumer<T> {
        Consumer {
            receiver: Arc::clone(&self.receiver),
        }
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Consumer<T> {
    /// Take the next item, or `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        self.receiver.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = WorkQueue::new(10);
        let consumer = queue.consumer();
        for i in 0..5 {
            queue.push(i).await.unwrap();
        }
        assert_eq!(queue.len(), 5);

        for i in 0..5 {
            assert_eq!(consumer.pop().await, Some(i));
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_push_waits_when_full() {
        let queue = WorkQueue::new(1);
        let consumer = queue.consumer();
        queue.push(1).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), queue.push(2)).await;
        assert!(blocked.is_err(), "push should wait for free capacity");

        assert_eq!(consumer.pop().await, Some(1));
        queue.push(3).await.unwrap();
        assert_eq!(consumer.pop().await, Some(3));
    }

    #[tokio::test]
    async fn test_closes_after_drain() {
        let queue = WorkQueue::new(4);
        let consumer = queue.consumer();
        queue.push("last").await.unwrap();
        drop(queue);

        assert_eq!(consumer.pop().await, Some("last"));
        assert_eq!(consumer.pop().await, None);
    }
}
