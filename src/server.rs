use std::sync::Arc;

use log::info;

use crate::config::{AppConfig, StorageBackend};
use crate::db::{Database, MemoryStore, PollStore};
use crate::error::AppError;
use crate::handlers;
use crate::service::PollService;

/// Open the configured store and serve the HTTP API until the process exits.
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    match config.storage {
        StorageBackend::Sqlite => {
            let database = Database::new(&config.database_url).await?;
            serve(Arc::new(database), &config).await
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; polls are lost on shutdown");
            serve(Arc::new(MemoryStore::new()), &config).await
        }
    }
}

async fn serve<S>(store: Arc<S>, config: &AppConfig) -> Result<(), AppError>
where
    S: PollStore + 'static,
{
    let service = PollService::new(store, config.public_base_url.clone());
    let app = handlers::router(service, &config.cors_origins)?;

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {} (links under {})", addr, config.public_base_url);

    axum::serve(listener, app).await?;
    Ok(())
}
