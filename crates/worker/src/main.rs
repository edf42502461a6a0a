use std::sync::Arc;

use anyhow::Context;
use herald_core::catalog;
use herald_core::clock::SystemClock;
use herald_core::config::HeraldConfig;
use herald_events::{
    Collaborators, EmailConfig, EmailDelivery, LogMailer, Mailer, NotificationEngine, PgStore, SqlDirectory,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "herald_worker=debug,herald_events=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = HeraldConfig::from_env().context("Invalid notification configuration")?;
    let registry = catalog::build_registry(&config.ignore_user_setting_types)
        .context("Invalid notification type registry")?;
    tracing::info!(
        types = registry.len(),
        portal_id = config.portal_id,
        strict = config.strict,
        "Loaded notification configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = herald_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    herald_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    herald_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Mail ---
    let mailer: Arc<dyn Mailer> = match EmailConfig::from_env().context("Invalid SMTP configuration")? {
        Some(email_config) => {
            tracing::info!(
                host = %email_config.host,
                port = email_config.port,
                security = ?email_config.security,
                "SMTP delivery enabled"
            );
            Arc::new(EmailDelivery::new(email_config).context("Invalid SMTP configuration")?)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, mails will only be logged");
            Arc::new(LogMailer)
        }
    };

    // --- Engine ---
    let directory = Arc::new(SqlDirectory::new(pool.clone()));
    let deps = Collaborators {
        registry: Arc::new(registry),
        store: Arc::new(PgStore::new(pool.clone())),
        objects: directory.clone(),
        users: directory,
        mailer,
        clock: Arc::new(SystemClock),
    };
    let engine = NotificationEngine::new(config, deps);

    let cancel = CancellationToken::new();

    let digest_scheduler = engine.digest_scheduler();
    let digest_cancel = cancel.clone();
    let digest_handle = tokio::spawn(async move {
        digest_scheduler.run(digest_cancel).await;
    });

    let sweeper = engine.retention_sweeper();
    let sweep_cancel = cancel.clone();
    let sweep_handle = tokio::spawn(async move {
        sweeper.run(sweep_cancel).await;
    });

    tracing::info!("Worker started (digest scheduler, retention sweep)");

    shutdown_signal().await;

    // --- Shutdown ---
    cancel.cancel();
    if let Err(e) = digest_handle.await {
        tracing::error!(error = %e, "Digest scheduler task failed");
    }
    if let Err(e) = sweep_handle.await {
        tracing::error!(error = %e, "Retention sweep task failed");
    }

    engine.shutdown().await;
    pool.close().await;
    tracing::info!("Graceful shutdown complete");

    Ok(())
}

/// Wait for SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
