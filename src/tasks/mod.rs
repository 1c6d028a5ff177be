//! Background tasks
//!
//! Work that should not block a request (emails, catalog import and export)
//! is queued as a [`Task`] and executed by a [`Worker`], either in-process or
//! from a NATS JetStream work queue. Delivery is at-least-once.

mod local;
mod nats;
mod worker;

pub use local::LocalTaskQueue;
pub use nats::{run_nats_worker, NatsTaskQueue};
pub use worker::Worker;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, OrderEvent, UserEvent};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    SendRegistrationEmail { user_id: i64, token: String },
    SendPasswordResetEmail { user_id: i64, uid: String, token: String },
    SendCustomerOrderEmail { order_id: i64, contact_id: Option<i64> },
    SendShopOrderEmail { order_id: i64, shop_id: i64 },
    LoadPartnerCatalog { path: String, uploader_id: i64 },
    ExportCatalog { path: String },
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendRegistrationEmail { .. } => "send_registration_email",
            Self::SendPasswordResetEmail { .. } => "send_password_reset_email",
            Self::SendCustomerOrderEmail { .. } => "send_customer_order_email",
            Self::SendShopOrderEmail { .. } => "send_shop_order_email",
            Self::LoadPartnerCatalog { .. } => "load_partner_catalog",
            Self::ExportCatalog { .. } => "export_catalog",
        }
    }
}

/// A queued task with the id its status is tracked under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: Uuid,
    #[serde(flatten)]
    pub task: Task,
}

impl TaskEnvelope {
    pub fn new(task: Task) -> Self { Self { id: Uuid::now_v7(), task } }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    #[default]
    Pending,
    Started,
    Success,
    Failure,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for TaskState {
    type Err = TaskError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [Self::Pending, Self::Started, Self::Success, Self::Failure]
            .into_iter()
            .find(|state| state.as_str() == value)
            .ok_or_else(|| TaskError::UnknownState(value.to_string()))
    }
}

/// What the status endpoint reports for a task id.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TaskReport {
    pub status: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task queue is closed")]
    Closed,

    #[error("message broker error: {0}")]
    Broker(String),

    #[error("malformed task payload")]
    Payload(#[from] serde_json::Error),

    #[error("unknown task state {0}")]
    UnknownState(String),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Queues `task` and returns the id its progress is recorded under.
    async fn enqueue(&self, task: Task) -> Result<Uuid, TaskError>;
}

/// Tasks that follow from a domain event.
pub fn tasks_for(event: DomainEvent) -> Vec<Task> {
    match event {
        DomainEvent::Order(OrderEvent::Confirmed { order_id, contact_id, supplier_shops, .. }) => {
            std::iter::once(Task::SendCustomerOrderEmail { order_id, contact_id })
                .chain(supplier_shops.into_iter().map(|shop_id| Task::SendShopOrderEmail { order_id, shop_id }))
                .collect()
        }
        DomainEvent::User(UserEvent::Registered { user_id, token }) => {
            vec![Task::SendRegistrationEmail { user_id, token }]
        }
        DomainEvent::User(UserEvent::PasswordResetRequested { user_id, uid, token }) => {
            vec![Task::SendPasswordResetEmail { user_id, uid, token }]
        }
    }
}

/// Queues the tasks for committed events. A failure to queue is logged and
/// does not undo the change that raised the event.
pub async fn dispatch_events(queue: &dyn TaskQueue, events: Vec<DomainEvent>) {
    for task in events.into_iter().flat_map(tasks_for) {
        let name = task.name();
        match queue.enqueue(task).await {
            Ok(id) => tracing::info!(task = name, %id, "task queued"),
            Err(e) => tracing::error!(task = name, error = %e, "failed to queue task"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(supplier_shops: Vec<i64>) -> DomainEvent {
        DomainEvent::Order(OrderEvent::Confirmed { order_id: 7, customer_id: 1, contact_id: Some(3), supplier_shops })
    }

    #[test]
    fn confirmation_fans_out_to_customer_and_shops() {
        assert_eq!(
            tasks_for(confirmed(vec![10, 11])),
            vec![
                Task::SendCustomerOrderEmail { order_id: 7, contact_id: Some(3) },
                Task::SendShopOrderEmail { order_id: 7, shop_id: 10 },
                Task::SendShopOrderEmail { order_id: 7, shop_id: 11 },
            ]
        );
    }

    #[test]
    fn envelope_wire_format() {
        let envelope = TaskEnvelope::new(Task::SendShopOrderEmail { order_id: 1, shop_id: 2 });
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["task"], "send_shop_order_email");
        assert_eq!(json["shop_id"], 2);
        assert_eq!(serde_json::from_value::<TaskEnvelope>(json).unwrap(), envelope);
    }

    #[test]
    fn report_omits_empty_fields() {
        let report = TaskReport::default();
        assert_eq!(serde_json::to_value(report).unwrap(), serde_json::json!({"status": "PENDING"}));
        assert_eq!("FAILURE".parse::<TaskState>().unwrap(), TaskState::Failure);
    }

    #[tokio::test]
    async fn dispatch_queues_one_task_per_recipient() {
        let mut queue = MockTaskQueue::new();
        queue.expect_enqueue().times(4).returning(|_| Ok(Uuid::now_v7()));

        dispatch_events(&queue, vec![confirmed(vec![10, 11, 12])]).await;
    }

    #[tokio::test]
    async fn dispatch_keeps_going_when_queue_fails() {
        let mut queue = MockTaskQueue::new();
        queue.expect_enqueue().times(2).returning(|_| Err(TaskError::Closed));

        dispatch_events(&queue, vec![confirmed(vec![10])]).await;
    }
}
