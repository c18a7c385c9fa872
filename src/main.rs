use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lostfound::api::{build_router, AppState};
use lostfound::auth::{JwksCache, TokenVerifier};
use lostfound::config::Config;
use lostfound::db::queue::MAX_BATCH_SIZE;
use lostfound::db::{
    create_pool, run_migrations, CategoryRepository, ItemRepository, NotificationQueue,
    PgCategoryRepository, PgItemRepository, PgNotificationQueue, PgSubscriptionRepository,
    SubscriptionRepository,
};
use lostfound::http_client::HttpClient;
use lostfound::services::{
    DisabledClassifier, EmailSender, HttpEmailSender, HttpLabelClassifier, IngestionService,
    LabelClassifier, LogEmailSender, NotificationConsumer, NotificationDispatcher,
    SubscriptionService, WorkerSettings,
};
use lostfound::storage::{ObjectStoreGateway, S3Backend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lostfound=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting lostfound server...");
    tracing::info!("Connecting to database...");

    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database connection established");

    let http = HttpClient::new(config.external_timeout()).context("Failed to build HTTP client")?;

    let backend = S3Backend::new(
        config.s3_bucket.clone(),
        &config.s3_region,
        config.aws_access_key_id.clone(),
        config.aws_secret_access_key.clone(),
    )?;
    tracing::info!("S3 storage enabled: bucket={}", config.s3_bucket);
    let storage = ObjectStoreGateway::new(Arc::new(backend), config.storage_timeout());

    let classifier: Arc<dyn LabelClassifier> = match &config.labels_service_url {
        Some(url) => {
            tracing::info!("Labeling service enabled: {}", url);
            Arc::new(HttpLabelClassifier::new(http.clone(), url.clone()))
        }
        None => {
            tracing::warn!("LABELS_SERVICE_URL not set, new items will be filed under Others");
            Arc::new(DisabledClassifier)
        }
    };

    let email: Arc<dyn EmailSender> = match &config.mail_relay_url {
        Some(url) => {
            tracing::info!("Mail relay enabled: {}", url);
            Arc::new(HttpEmailSender::new(http.clone(), url.clone()))
        }
        None => {
            tracing::warn!("MAIL_RELAY_URL not set, emails will only be logged");
            Arc::new(LogEmailSender)
        }
    };

    let items: Arc<dyn ItemRepository> = Arc::new(PgItemRepository::new(pool.clone()));
    let categories: Arc<dyn CategoryRepository> = Arc::new(PgCategoryRepository::new(pool.clone()));
    let subscriptions: Arc<dyn SubscriptionRepository> =
        Arc::new(PgSubscriptionRepository::new(pool.clone()));
    let queue: Arc<dyn NotificationQueue> = Arc::new(PgNotificationQueue::new(pool.clone()));

    let ingestion = IngestionService::new(
        storage,
        classifier,
        items.clone(),
        categories.clone(),
        NotificationDispatcher::new(queue.clone()),
    );
    let subscription_service = SubscriptionService::new(
        subscriptions.clone(),
        categories.clone(),
        email.clone(),
        config.sender_email.clone(),
    );

    let verifier = match &config.auth_jwks_url {
        Some(url) => {
            tracing::info!("Admin checks enabled: jwks={}", url);
            let cache = JwksCache::new(
                http.clone(),
                url.clone(),
                Duration::from_secs(config.auth_jwks_ttl_secs),
            );
            Some(TokenVerifier::new(Arc::new(cache)))
        }
        None => {
            tracing::warn!("AUTH_JWKS_URL not set, item mutations are not protected");
            None
        }
    };

    // Notification workers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = Arc::new(NotificationConsumer::new(
        items.clone(),
        categories.clone(),
        subscriptions,
        email,
        config.sender_email.clone(),
        config.site_url.clone(),
    ));
    let settings = WorkerSettings {
        batch_size: MAX_BATCH_SIZE,
        poll_interval: Duration::from_secs(config.queue_poll_interval_secs),
        visibility_timeout: Duration::from_secs(config.queue_visibility_timeout_secs),
    };
    let workers: Vec<_> = (0..config.notification_workers)
        .map(|_| {
            let consumer = consumer.clone();
            let queue = queue.clone();
            let settings = settings.clone();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move { consumer.run(queue, settings, shutdown).await })
        })
        .collect();
    tracing::info!("Spawned {} notification worker(s)", workers.len());

    let state = AppState {
        ingestion: Arc::new(ingestion),
        items,
        categories,
        subscriptions: Arc::new(subscription_service),
        verifier,
    };
    let app = build_router(state, config.max_upload_bytes);

    let addr: SocketAddr = config.server_addr().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!("Notification worker panicked: {}", e);
        }
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
