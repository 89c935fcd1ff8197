use std::sync::Arc;

use mosaic_blob::BlobStore;
use mosaic_db::Database;

use crate::error::ApiError;
use crate::images::ImageService;
use crate::reconciler::{self, Reconciler};
use crate::tokens::{TokenConfig, TokenService};

pub type AppState = Arc<AppStateInner>;

/// Knobs the server reads from its environment.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub tokens: TokenConfig,
    /// Enables the admin routes when set.
    pub api_key: Option<String>,
    pub upload_max_bytes: usize,
    pub reconcile_window: usize,
}

impl ApiSettings {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            tokens: TokenConfig::new(jwt_secret),
            api_key: None,
            upload_max_bytes: 10 * 1024 * 1024,
            reconcile_window: reconciler::DEFAULT_WINDOW,
        }
    }
}

/// Every handle a request can touch. Built once in `main` and shared.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub blobs: BlobStore,
    pub tokens: TokenService,
    pub images: ImageService,
    pub reconciler: Reconciler,
    pub api_key: Option<String>,
    pub upload_max_bytes: usize,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, blobs: BlobStore, settings: ApiSettings) -> AppState {
        Arc::new(Self {
            tokens: TokenService::new(db.clone(), &settings.tokens),
            images: ImageService::new(db.clone(), blobs.clone()),
            reconciler: Reconciler::new(db.clone(), blobs.clone())
                .with_window(settings.reconcile_window),
            db,
            blobs,
            api_key: settings.api_key,
            upload_max_bytes: settings.upload_max_bytes,
        })
    }
}

/// Run synchronous store work on the blocking pool.
pub async fn blocking<F, T, E>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(Into::into)
}
