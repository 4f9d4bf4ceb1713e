use std::path::Path;
use std::sync::Arc;

use pita_store::{DocumentStore, NodeLister, PathResolver, ViewEngine, WriteCoordinator};

use crate::config::Config;
use crate::error::ApiError;

/// Everything a request handler needs, shared behind an `Arc`.
#[derive(Debug)]
pub struct AppState {
    pub resolver: PathResolver,
    pub lister: NodeLister,
    pub views: ViewEngine,
    pub writer: WriteCoordinator,
}

impl AppState {
    pub fn new(config: &Config) -> pita_store::Result<Self> {
        let documents = DocumentStore::new(config.database_directory.clone())?;
        let resolver = PathResolver::new(documents.clone());

        Ok(Self {
            lister: NodeLister::new(
                documents,
                config.view_directory.clone(),
                &config.base_url,
            ),
            views: ViewEngine::new(resolver.clone(), config.view_directory.clone()),
            writer: WriteCoordinator::new(resolver.clone()),
            resolver,
        })
    }

    /// Canonical store root.
    pub fn root(&self) -> &Path {
        self.resolver.documents().root()
    }
}

/// Run a store operation on the blocking pool; the store does synchronous file I/O.
pub async fn blocking<T, F>(state: &Arc<AppState>, operation: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppState) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || operation(&state))
        .await
        .map_err(|e| ApiError::internal(format!("Store operation failed: {}", e)))?
}
