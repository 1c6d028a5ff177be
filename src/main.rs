//! Marketplace backend

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use marketplace::{
    config::{Command, Config, LogFormat},
    context::{self, AppContext},
    database::{self, Db},
    http,
    services::{AccountsService, CatalogTransfer, PgAccountsService},
    tasks::{run_nats_worker, LocalTaskQueue},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().unwrap_or_else(|e| e.exit());

    init_tracing(config.log_format);

    let pool = database::connect(&config.database_url, config.database_max_connections)
        .await
        .context("failed to connect to database")?;
    database::migrate(&pool).await.context("failed to run migrations")?;

    match config.command() {
        Command::Serve => serve(pool, &config).await,
        Command::Worker => {
            let url = config.nats_url.as_deref().context("the worker consumes tasks from NATS, set NATS_URL")?;
            let db = Db::new(pool);
            let worker = context::worker(&db, context::mailer(&config)?, &config);
            run_nats_worker(context::nats_client(url).await?, worker).await?;
            Ok(())
        }
        Command::LoadCatalog { file, uploader } => {
            let summary = CatalogTransfer::new(Db::new(pool)).load_file(&file, uploader).await?;
            info!(shop = %summary.shop, products = summary.products, skipped = summary.skipped.len(), "catalog loaded");
            Ok(())
        }
        Command::ExportCatalog { file } => {
            let summary = CatalogTransfer::new(Db::new(pool)).export_to(&file).await?;
            info!(file = %summary.file, products = summary.products, "catalog exported");
            Ok(())
        }
        Command::CreateSuperuser { email, password } => {
            // Nothing is queued for superusers; the queue only has to exist.
            let (queue, _worker) = LocalTaskQueue::with_handler(|_| async {});
            let accounts = PgAccountsService::new(Db::new(pool), context::jwt_keys(&config), Arc::new(queue));
            let user = accounts.create_superuser(email, password).await?;
            info!(user_id = user.id, email = %user.email, "superuser created");
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(pool: sqlx::PgPool, config: &Config) -> Result<()> {
    let (app, worker) = AppContext::from_pool(pool, config).await?;

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("marketplace listening on {}", config.bind_addr);

    axum::serve(listener, http::router(app)).with_graceful_shutdown(shutdown_signal()).await?;

    if let Some(worker) = worker {
        worker.abort();
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
