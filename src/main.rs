use anyhow::{Context, Result};
use axum::Router;
use resource_store::{
    config::AppConfig,
    db,
    routes::routes::routes,
    services::{
        bucket_repository::BucketRepository, content_store::ContentStore,
        dispatcher::WebhookDispatcher, resource_repository::ResourceRepository,
        resource_service::ResourceService, webhook_repository::WebhookRepository,
        webhook_service::WebhookService,
    },
    state::AppState,
};
use std::{io::ErrorKind, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for in-flight webhook deliveries.
const DELIVERY_GRACE: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting resource-store with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);
    db::run_migrations(&db).await?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let store = ContentStore::new(&cfg.storage_dir)
        .await
        .with_context(|| format!("preparing storage directory {}", cfg.storage_dir))?;
    let buckets = BucketRepository::new(db.clone());
    let webhooks = WebhookRepository::new(db.clone());
    let dispatcher = WebhookDispatcher::new(webhooks.clone(), cfg.max_concurrent_deliveries)
        .context("building webhook client")?;

    let state = AppState {
        resources: ResourceService::new(
            buckets.clone(),
            ResourceRepository::new(db.clone()),
            store,
            Arc::new(dispatcher.clone()),
            cfg.public_url.clone(),
        ),
        webhooks: WebhookService::new(buckets, webhooks),
    };

    // --- Build router ---
    let app: Router = routes(cfg.max_upload_bytes).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Drain webhook deliveries ---
    if !dispatcher.shutdown(DELIVERY_GRACE).await {
        tracing::warn!(
            "Webhook deliveries still in flight after {:?}; abandoning them",
            DELIVERY_GRACE
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server");
}
