//! In-process task queue backed by a tokio channel.

use async_trait::async_trait;
use std::future::Future;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use super::{Task, TaskEnvelope, TaskError, TaskQueue, Worker};

/// Queue used when no broker is configured. Tasks run one at a time on a
/// background tokio task and are lost if the process exits first.
#[derive(Clone, Debug)]
pub struct LocalTaskQueue {
    sender: mpsc::UnboundedSender<TaskEnvelope>,
}

impl LocalTaskQueue {
    pub fn spawn(worker: Worker) -> (Self, JoinHandle<()>) {
        Self::with_handler(move |envelope| {
            let worker = worker.clone();
            async move { worker.run(envelope).await }
        })
    }

    pub fn with_handler<F, Fut>(handler: F) -> (Self, JoinHandle<()>)
    where
        F: Fn(TaskEnvelope) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<TaskEnvelope>();
        let handle = tokio::spawn(async move {
            tracing::info!("local task worker starting");
            while let Some(envelope) = receiver.recv().await {
                handler(envelope).await;
            }
            tracing::info!("local task worker stopped");
        });
        (Self { sender }, handle)
    }
}

#[async_trait]
impl TaskQueue for LocalTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<Uuid, TaskError> {
        let envelope = TaskEnvelope::new(task);
        let id = envelope.id;
        self.sender.send(envelope).map_err(|_| TaskError::Closed)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tasks_reach_the_handler_in_order() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let (queue, handle) = LocalTaskQueue::with_handler(move |envelope| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(envelope);
            }
        });

        let first = queue.enqueue(Task::ExportCatalog { path: "a.json".into() }).await.unwrap();
        let second = queue.enqueue(Task::SendShopOrderEmail { order_id: 1, shop_id: 2 }).await.unwrap();

        assert_eq!(seen_rx.recv().await.map(|e| e.id), Some(first));
        assert_eq!(seen_rx.recv().await.map(|e| e.id), Some(second));

        drop(queue);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn enqueue_fails_once_worker_is_gone() {
        let (queue, handle) = LocalTaskQueue::with_handler(|_| async {});
        handle.abort();
        let _ = handle.await;

        let result = queue.enqueue(Task::ExportCatalog { path: "a.json".into() }).await;
        assert!(matches!(result, Err(TaskError::Closed)));
    }
}
