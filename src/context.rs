//! App Context

use std::sync::Arc;

use chrono::Duration;
use sqlx::PgPool;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::{
    auth::JwtKeys,
    config::Config,
    database::Db,
    mail::{LogMailer, MailError, Mailer, SmtpMailer, SmtpSettings},
    services::{
        AccountsService, CatalogService, ContactsService, OrdersService, PartnersService, PgAccountsService,
        PgCatalogService, PgContactsService, PgOrdersService, PgPartnersService,
    },
    tasks::{LocalTaskQueue, NatsTaskQueue, TaskError, TaskQueue, Worker},
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to configure mail delivery")]
    Mail(#[source] MailError),

    #[error("failed to connect to NATS")]
    Nats(#[source] async_nats::ConnectError),

    #[error("failed to set up the task stream")]
    Tasks(#[source] TaskError),
}

#[derive(Clone)]
pub struct AppContext {
    pub accounts: Arc<dyn AccountsService>,
    pub catalog: Arc<dyn CatalogService>,
    pub contacts: Arc<dyn ContactsService>,
    pub orders: Arc<dyn OrdersService>,
    pub partners: Arc<dyn PartnersService>,
}

impl AppContext {
    #[must_use]
    pub fn new(db: Db, keys: JwtKeys, queue: Arc<dyn TaskQueue>, config: &Config) -> Self {
        Self {
            accounts: Arc::new(PgAccountsService::new(db.clone(), keys, queue.clone())),
            catalog: Arc::new(PgCatalogService::new(db.clone())),
            contacts: Arc::new(PgContactsService::new(db.clone())),
            orders: Arc::new(PgOrdersService::new(db.clone(), queue.clone())),
            partners: Arc::new(PgPartnersService::new(db, queue, config.data_dir.clone())),
        }
    }

    /// Build the context for the HTTP server, including its task queue. The
    /// returned handle is the in-process worker, if one was started.
    ///
    /// # Errors
    ///
    /// Returns an error when the mailer or the task queue cannot be set up.
    pub async fn from_pool(pool: PgPool, config: &Config) -> Result<(Self, Option<JoinHandle<()>>), AppInitError> {
        let db = Db::new(pool);
        let (queue, worker) = task_queue(&db, config).await?;

        Ok((Self::new(db, jwt_keys(config), queue, config), worker))
    }
}

#[must_use]
pub fn jwt_keys(config: &Config) -> JwtKeys {
    JwtKeys::new(
        config.jwt_secret.as_bytes(),
        Duration::minutes(config.access_token_minutes),
        Duration::days(config.refresh_token_days),
    )
}

/// SMTP delivery when a host is configured, the log otherwise.
///
/// # Errors
///
/// Returns an error when the SMTP settings are unusable.
pub fn mailer(config: &Config) -> Result<Arc<dyn Mailer>, AppInitError> {
    let Some(host) = &config.smtp_host else {
        tracing::warn!("SMTP_HOST not set, emails will only be logged");
        return Ok(Arc::new(LogMailer));
    };

    let mailer = SmtpMailer::new(SmtpSettings {
        host: host.clone(),
        port: config.smtp_port,
        username: config.smtp_username.clone(),
        password: config.smtp_password.clone(),
        from: config.email_from.clone(),
    })
    .map_err(AppInitError::Mail)?;

    Ok(Arc::new(mailer))
}

#[must_use]
pub fn worker(db: &Db, mailer: Arc<dyn Mailer>, config: &Config) -> Worker {
    Worker::new(db.clone(), mailer, config.backend_url.clone())
}

/// Connects to NATS.
///
/// # Errors
///
/// Returns an error when the server cannot be reached.
pub async fn nats_client(url: &str) -> Result<async_nats::Client, AppInitError> {
    async_nats::connect(url).await.map_err(AppInitError::Nats)
}

/// JetStream when `NATS_URL` is set; otherwise an in-process queue with its own worker.
async fn task_queue(db: &Db, config: &Config) -> Result<(Arc<dyn TaskQueue>, Option<JoinHandle<()>>), AppInitError> {
    match &config.nats_url {
        Some(url) => {
            let client = nats_client(url).await?;
            let queue = NatsTaskQueue::new(client).await.map_err(AppInitError::Tasks)?;
            tracing::info!(%url, "tasks go to NATS JetStream");
            Ok((Arc::new(queue), None))
        }
        None => {
            let (queue, handle) = LocalTaskQueue::spawn(worker(db, mailer(config)?, config));
            tracing::info!("NATS_URL not set, tasks run in-process");
            Ok((Arc::new(queue), Some(handle)))
        }
    }
}
