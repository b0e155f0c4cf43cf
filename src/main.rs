use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use wallpoll::{
    config,
    routes::routes::{RouteOptions, routes},
    services::wallpoll_service::WallPollService,
    storage::{
        BlobStore, KvStore, db,
        disk_blob::DiskBlobStore,
        memory::{MemoryBlobStore, MemoryKvStore},
        sqlite_kv::SqliteKvStore,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wallpoll=info,tower_http=info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting wallpoll with config: {:?}", cfg);

    // --- Initialize storage ---
    let (kv, blobs): (Arc<dyn KvStore>, Arc<dyn BlobStore>) = if cfg.in_memory {
        if migrate {
            anyhow::bail!("--migrate has nothing to do with --in-memory");
        }
        tracing::warn!("Running with in-memory storage; all state is lost on exit");
        (
            Arc::new(MemoryKvStore::new()),
            Arc::new(MemoryBlobStore::new()),
        )
    } else {
        if !Path::new(&cfg.storage_dir).exists() {
            fs::create_dir_all(&cfg.storage_dir)?;
            tracing::info!("Created storage directory at {}", cfg.storage_dir);
        }

        let pool = Arc::new(db::connect(&cfg.database_url, 5).await?);
        db::run_migrations(&pool).await?;

        // --- Handle migration mode ---
        if migrate {
            tracing::info!("Database migration complete.");
            return Ok(()); // exit after migration
        }

        (
            Arc::new(SqliteKvStore::new(pool.clone())),
            Arc::new(DiskBlobStore::new(pool, cfg.storage_dir.clone())),
        )
    };

    // --- Initialize core service ---
    let service = WallPollService::new(kv, blobs);

    // --- Build router ---
    let options = RouteOptions {
        static_dir: Some(cfg.static_path()),
        max_upload_bytes: cfg.max_upload_bytes,
    };
    let app: Router = routes(&options).with_state(service);

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
