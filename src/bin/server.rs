//! `rds-server`: hosts the HTTP surface (spec.md §6) over the datastore(s)
//! configured via `Config`. Not present in the Python original (which ships
//! this as a Django app); grounded in the teacher's `main.rs`
//! (`Router`/`CorsLayer`/`TcpListener`/`axum::serve` shape).

use std::sync::Arc;

use tokio::net::TcpListener;

use reldatasync::config::{init_tracing, Config};
use reldatasync::datastore::memory::MemoryBackend;
use reldatasync::datastore::sqlite::SqliteBackend;
use reldatasync::datastore::Store;
use reldatasync::http::{build_router, DatastoreRegistry};
use sqlx::SqlitePool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    let registry = build_registry(&config).await?;
    let app = build_router(registry);

    let addr = config.server_address();
    tracing::info!(%addr, "rds-server listening");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Builds a small default registry: an always-available in-memory
/// `default/scratch` datastore for smoke-testing the wire format, plus a
/// SQLite-backed `default/widgets` datastore if `DATABASE_URL` names a
/// SQLite file with a `widgets` table already present.
async fn build_registry(config: &Config) -> anyhow::Result<DatastoreRegistry> {
    let mut builder = DatastoreRegistry::builder().register(
        "default",
        "scratch",
        Arc::new(Store::new(MemoryBackend::generated("default"))),
    );

    if config.database.url.starts_with("sqlite://") {
        let path = config.database.url.trim_start_matches("sqlite://");
        if let Ok(pool) = SqlitePool::connect(path).await {
            if let Ok(backend) = SqliteBackend::acquire(pool, "widgets", "default", None, None).await {
                builder = builder.register("default", "widgets", Arc::new(Store::new(backend)));
            }
        }
    }

    Ok(builder.build())
}
