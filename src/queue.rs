use async_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;

use crate::models::Job;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue full, try again later")]
    Full(Box<Job>),
    #[error("queue is closed")]
    Closed(Box<Job>),
}

/// Fixed-capacity FIFO shared by request handlers (producers) and workers
/// (consumers). Cloning yields another handle to the same queue.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Never waits: a full queue is reported immediately.
    pub fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        self.tx.try_send(job).map_err(|err| match err {
            TrySendError::Full(job) => QueueError::Full(Box::new(job)),
            TrySendError::Closed(job) => QueueError::Closed(Box::new(job)),
        })
    }

    /// Waits for the next job. `None` once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<Job> {
        self.rx.recv().await.ok()
    }

    pub fn try_dequeue(&self) -> Option<Job> {
        self.rx.try_recv().ok()
    }

    pub fn close(&self) {
        self.tx.close();
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::{QueueError, WorkQueue};
    use crate::models::{Job, JobInput};

    fn job(id: &str) -> Job {
        let (result_tx, _result_rx) = oneshot::channel();
        Job {
            id: id.to_string(),
            from: "markdown".to_string(),
            to: "html".to_string(),
            input: JobInput::Inline("# Hi".to_string()),
            result_tx,
        }
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let queue = WorkQueue::new(2);
        queue.enqueue(job("a")).expect("first");
        queue.enqueue(job("b")).expect("second");

        match queue.enqueue(job("c")) {
            Err(QueueError::Full(rejected)) => assert_eq!(rejected.id, "c"),
            other => panic!("expected a full queue, got {other:?}"),
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.capacity(), 2);
    }

    #[tokio::test]
    async fn dequeues_in_fifo_order() {
        let queue = WorkQueue::new(4);
        for id in ["a", "b", "c"] {
            queue.enqueue(job(id)).unwrap();
        }
        let order: Vec<String> = [
            queue.dequeue().await.unwrap().id,
            queue.dequeue().await.unwrap().id,
            queue.dequeue().await.unwrap().id,
        ]
        .into();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn closed_queue_drains_then_ends() {
        let queue = WorkQueue::new(4);
        queue.enqueue(job("a")).unwrap();
        queue.close();

        assert!(matches!(queue.enqueue(job("b")), Err(QueueError::Closed(_))));
        assert_eq!(queue.dequeue().await.unwrap().id, "a");
        assert!(queue.dequeue().await.is_none());
    }
}
