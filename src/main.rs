use anyhow::Result;
use catalog::{
    config::{AppConfig, RunMode},
    database,
    images::lifecycle::ImageLifecycle,
    services::{asset_store::AssetStore, product_service::ProductService},
    state::AppState,
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting product-catalog with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db = Arc::new(database::connect(&cfg.database_url, 5).await?);

    // --- Handle migration mode ---
    if mode == RunMode::Migrate {
        database::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Initialize core services ---
    let assets = AssetStore::new(
        &cfg.storage_dir,
        &cfg.public_url,
        &cfg.asset_folder,
        cfg.max_upload_bytes,
    );
    let lifecycle = ImageLifecycle::new(Arc::new(assets.clone()), cfg.delete_timeout);
    let products = ProductService::new(db.clone(), lifecycle);

    // --- Handle reconcile mode ---
    if mode == RunMode::Reconcile {
        let summary = products.reconcile_failed_deletions().await?;
        tracing::info!(
            "Reconciliation complete: {} retried, {} resolved, {} remaining.",
            summary.retried,
            summary.resolved,
            summary.remaining
        );
        return Ok(());
    }

    // --- Build router ---
    let app = catalog::app(AppState { products, assets });

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
    axum::serve(listener, app).await?;

    Ok(())
}
