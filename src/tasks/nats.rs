//! Task queue on a NATS JetStream work-queue stream.
//!
//! Every worker process binds the same durable pull consumer, so each task is
//! handed to one worker and removed from the stream once acknowledged.

use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, PullConsumer},
    stream::{self, RetentionPolicy},
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::{fmt::Display, future::Future};
use uuid::Uuid;

use super::{Task, TaskEnvelope, TaskError, TaskQueue, Worker};

pub const STREAM_NAME: &str = "MARKETPLACE_TASKS";
pub const SUBJECT: &str = "marketplace.tasks";
const CONSUMER_NAME: &str = "workers";

#[derive(Clone)]
pub struct NatsTaskQueue {
    jetstream: jetstream::Context,
}

impl NatsTaskQueue {
    pub async fn new(client: async_nats::Client) -> Result<Self, TaskError> {
        let jetstream = jetstream::new(client);
        ensure_stream(&jetstream).await?;
        Ok(Self { jetstream })
    }
}

#[async_trait]
impl TaskQueue for NatsTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<Uuid, TaskError> {
        let envelope = TaskEnvelope::new(task);
        let payload = serde_json::to_vec(&envelope)?;
        self.jetstream
            .publish(SUBJECT.to_string(), payload.into())
            .await
            .map_err(broker)?
            .await
            .map_err(broker)?;
        Ok(envelope.id)
    }
}

/// Consumes tasks until the connection closes. A message is acknowledged after
/// the worker finishes with it, whatever the outcome.
pub async fn run_nats_worker(client: async_nats::Client, worker: Worker) -> Result<(), TaskError> {
    let jetstream = jetstream::new(client);
    let stream = ensure_stream(&jetstream).await?;
    let consumer: PullConsumer = stream
        .get_or_create_consumer(
            CONSUMER_NAME,
            pull::Config {
                durable_name: Some(CONSUMER_NAME.to_string()),
                ack_policy: AckPolicy::Explicit,
                ..Default::default()
            },
        )
        .await
        .map_err(broker)?;

    let messages = consumer.messages().await.map_err(broker)?;
    tracing::info!(stream = STREAM_NAME, consumer = CONSUMER_NAME, "worker consuming tasks");

    consume(messages, |envelope| worker.run(envelope)).await;
    Ok(())
}

#[async_trait]
trait Delivery: Send + Sync {
    fn payload(&self) -> &[u8];

    async fn ack(&self) -> Result<(), TaskError>;
}

#[async_trait]
impl Delivery for jetstream::Message {
    fn payload(&self) -> &[u8] { &self.message.payload }

    async fn ack(&self) -> Result<(), TaskError> { jetstream::Message::ack(self).await.map_err(broker) }
}

/// Runs every delivered task. Receive and acknowledgement failures are logged
/// and skipped so the worker keeps consuming.
async fn consume<S, D, E, F, Fut>(mut messages: S, mut handle: F)
where
    S: Stream<Item = Result<D, E>> + Unpin,
    D: Delivery,
    E: Display,
    F: FnMut(TaskEnvelope) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(message) = messages.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "failed to receive task");
                continue;
            }
        };
        match serde_json::from_slice::<TaskEnvelope>(message.payload()) {
            Ok(envelope) => handle(envelope).await,
            Err(e) => tracing::error!(error = %e, "discarding malformed task"),
        }
        if let Err(e) = message.ack().await {
            tracing::warn!(error = %e, "failed to acknowledge task");
        }
    }
}

async fn ensure_stream(jetstream: &jetstream::Context) -> Result<stream::Stream, TaskError> {
    jetstream
        .get_or_create_stream(stream::Config {
            name: STREAM_NAME.to_string(),
            subjects: vec![SUBJECT.to_string()],
            retention: RetentionPolicy::WorkQueue,
            ..Default::default()
        })
        .await
        .map_err(broker)
}

fn broker(error: impl std::fmt::Display) -> TaskError { TaskError::Broker(error.to_string()) }

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct FakeDelivery {
        payload: Vec<u8>,
        acks: Arc<AtomicUsize>,
        ack_fails: bool,
    }

    #[async_trait]
    impl Delivery for FakeDelivery {
        fn payload(&self) -> &[u8] { &self.payload }

        async fn ack(&self) -> Result<(), TaskError> {
            self.acks.fetch_add(1, Ordering::SeqCst);
            if self.ack_fails {
                return Err(TaskError::Broker("ack timed out".into()));
            }
            Ok(())
        }
    }

    fn delivery(task: &TaskEnvelope, acks: &Arc<AtomicUsize>, ack_fails: bool) -> FakeDelivery {
        FakeDelivery { payload: serde_json::to_vec(task).unwrap(), acks: Arc::clone(acks), ack_fails }
    }

    #[tokio::test]
    async fn worker_keeps_consuming_after_broker_errors() {
        let acks = Arc::new(AtomicUsize::new(0));
        let first = TaskEnvelope::new(Task::ExportCatalog { path: "a.json".into() });
        let second = TaskEnvelope::new(Task::SendShopOrderEmail { order_id: 1, shop_id: 2 });
        let malformed = FakeDelivery { payload: b"not json".to_vec(), acks: Arc::clone(&acks), ack_fails: false };
        let messages = futures::stream::iter(vec![
            Err("missed heartbeat"),
            Ok(delivery(&first, &acks, true)),
            Ok(malformed),
            Ok(delivery(&second, &acks, false)),
        ]);

        let mut handled = Vec::new();
        consume(messages, |envelope| {
            handled.push(envelope.id);
            async {}
        })
        .await;

        assert_eq!(handled, vec![first.id, second.id]);
        assert_eq!(acks.load(Ordering::SeqCst), 3);
    }
}
