//! Task execution

use serde_json::{json, Value};
use std::{path::Path, sync::Arc};
use thiserror::Error;
use tracing::instrument;

use super::{Task, TaskEnvelope, TaskState};
use crate::{
    database::Db,
    mail::{templates, Email, MailError, Mailer},
    repositories::{PgContactsRepository, PgOrdersRepository, PgShopsRepository, PgTaskResultsRepository, PgUsersRepository},
    services::{CatalogTransfer, ServiceError},
};

#[derive(Debug, Error)]
enum JobError {
    #[error("{0} not found")]
    Missing(&'static str),

    #[error("storage error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("mail delivery failed: {0}")]
    Mail(#[from] MailError),

    #[error("{0}")]
    Catalog(#[from] ServiceError),
}

/// Runs queued tasks and records their progress in `task_results`.
#[derive(Clone)]
pub struct Worker {
    db: Db,
    mailer: Arc<dyn Mailer>,
    transfer: CatalogTransfer,
    backend_url: String,
    results: PgTaskResultsRepository,
    users: PgUsersRepository,
    orders: PgOrdersRepository,
    contacts: PgContactsRepository,
    shops: PgShopsRepository,
}

impl Worker {
    #[must_use]
    pub fn new(db: Db, mailer: Arc<dyn Mailer>, backend_url: impl Into<String>) -> Self {
        Self {
            transfer: CatalogTransfer::new(db.clone()),
            results: PgTaskResultsRepository::new(db.pool().clone()),
            db,
            mailer,
            backend_url: backend_url.into(),
            users: PgUsersRepository::new(),
            orders: PgOrdersRepository::new(),
            contacts: PgContactsRepository::new(),
            shops: PgShopsRepository::new(),
        }
    }

    /// Executes one task. Failures are recorded and logged, never retried.
    #[instrument(skip_all, fields(task_id = %envelope.id, task = envelope.task.name()))]
    pub async fn run(&self, envelope: TaskEnvelope) {
        let name = envelope.task.name();
        self.record(&envelope, TaskState::Started, None, None).await;

        match self.execute(envelope.task.clone()).await {
            Ok(result) => {
                tracing::info!("task succeeded");
                self.record(&envelope, TaskState::Success, Some(&result), None).await;
            }
            Err(e) => {
                tracing::error!(error = %e, task = name, "task failed");
                self.record(&envelope, TaskState::Failure, None, Some(&e.to_string())).await;
            }
        }
    }

    async fn record(&self, envelope: &TaskEnvelope, state: TaskState, result: Option<&Value>, error: Option<&str>) {
        let recorded = self.results.record(envelope.id, envelope.task.name(), state.as_str(), result, error).await;
        if let Err(e) = recorded {
            tracing::warn!(error = %e, state = %state, "failed to record task state");
        }
    }

    async fn execute(&self, task: Task) -> Result<Value, JobError> {
        match task {
            Task::SendRegistrationEmail { user_id, token } => {
                let user = self.user_email(user_id).await?;
                self.deliver(templates::registration(&user, &self.backend_url, &token)).await
            }
            Task::SendPasswordResetEmail { user_id, uid, token } => {
                let user = self.user_email(user_id).await?;
                self.deliver(templates::password_reset(&user, &self.backend_url, &uid, &token)).await
            }
            Task::SendCustomerOrderEmail { order_id, contact_id } => {
                self.send_customer_order_email(order_id, contact_id).await
            }
            Task::SendShopOrderEmail { order_id, shop_id } => self.send_shop_order_email(order_id, shop_id).await,
            Task::LoadPartnerCatalog { path, uploader_id } => {
                let summary = self.transfer.load_file(Path::new(&path), Some(uploader_id)).await?;
                Ok(json!(summary))
            }
            Task::ExportCatalog { path } => {
                let summary = self.transfer.export_to(Path::new(&path)).await?;
                Ok(json!(summary))
            }
        }
    }

    async fn user_email(&self, user_id: i64) -> Result<String, JobError> {
        let mut tx = self.db.begin().await?;
        let user = self.users.find(&mut tx, user_id).await?.ok_or(JobError::Missing("user"))?;
        tx.commit().await?;
        Ok(user.email)
    }

    /// The customer's copy lists every item. The contact is the one chosen at
    /// confirmation, falling back to the customer's first contact.
    async fn send_customer_order_email(&self, order_id: i64, contact_id: Option<i64>) -> Result<Value, JobError> {
        let mut tx = self.db.begin().await?;
        let order = self.orders.find(&mut tx, order_id).await?.ok_or(JobError::Missing("order"))?;
        let customer = self.users.find(&mut tx, order.user_id()).await?.ok_or(JobError::Missing("user"))?;
        let contact = match contact_id.or(order.contact_id()) {
            Some(id) => self.contacts.find(&mut tx, id).await?.filter(|contact| contact.user_id == customer.id),
            None => self.contacts.first_for_user(&mut tx, customer.id).await?,
        };
        let lines = self.orders.lines(&mut tx, order_id, None).await?;
        tx.commit().await?;

        self.deliver(templates::customer_order(&customer.email, order_id, &lines, contact.as_ref())).await
    }

    /// Each supplier only sees the items of their own shop. Nothing is sent
    /// when the shop has no owner or the owner placed the order.
    async fn send_shop_order_email(&self, order_id: i64, shop_id: i64) -> Result<Value, JobError> {
        let mut tx = self.db.begin().await?;
        let order = self.orders.find(&mut tx, order_id).await?.ok_or(JobError::Missing("order"))?;
        let shop = self.shops.find(&mut tx, shop_id).await?.ok_or(JobError::Missing("shop"))?;
        let owner = match shop.user_id {
            Some(owner) if owner != order.user_id() => owner,
            _ => {
                tracing::info!(order_id, shop_id, "shop owner is the customer or absent, email not sent");
                return Ok(json!({ "sent": false }));
            }
        };
        let supplier = self.users.find(&mut tx, owner).await?.ok_or(JobError::Missing("user"))?;
        let contact = match order.contact_id() {
            Some(id) => self.contacts.find(&mut tx, id).await?,
            None => self.contacts.first_for_user(&mut tx, order.user_id()).await?,
        };
        let lines = self.orders.lines(&mut tx, order_id, Some(shop_id)).await?;
        tx.commit().await?;

        self.deliver(templates::supplier_order(&supplier.email, order_id, &lines, contact.as_ref())).await
    }

    async fn deliver(&self, email: Email) -> Result<Value, JobError> { deliver(self.mailer.as_ref(), email).await }
}

async fn deliver(mailer: &dyn Mailer, email: Email) -> Result<Value, JobError> {
    let to = email.to.clone();
    let subject = email.subject.clone();
    mailer.send(email).await?;
    tracing::info!(%to, %subject, "email sent");
    Ok(json!({ "sent": true, "to": to }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::MockMailer;

    fn email() -> Email {
        Email { to: "buyer@example.com".into(), subject: "Ваш заказ подтвержден".into(), body: "...".into() }
    }

    #[tokio::test]
    async fn delivery_reports_recipient() {
        let mut mailer = MockMailer::new();
        mailer.expect_send().withf(|email| email.to == "buyer@example.com").times(1).returning(|_| Ok(()));

        let result = deliver(&mailer, email()).await.unwrap();
        assert_eq!(result, json!({ "sent": true, "to": "buyer@example.com" }));
    }

    #[tokio::test]
    async fn delivery_failure_becomes_task_failure() {
        let mut mailer = MockMailer::new();
        mailer.expect_send().times(1).returning(|email| Err(MailError::Address(email.to)));

        let error = deliver(&mailer, email()).await.unwrap_err();
        assert!(matches!(error, JobError::Mail(_)));
        assert!(error.to_string().contains("buyer@example.com"));
    }
}
