//! Consistency reconciler.
//!
//! Diffs image rows against the blob store. Only the relational side is ever
//! repaired: rows whose blob is gone are deleted with their feed entries.
//! Blobs without a row are reported, never imported, since their metadata
//! cannot be rebuilt from the bytes alone.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use mosaic_blob::BlobStore;
use mosaic_db::Database;
use mosaic_types::api::{ConsistencyReport, RepairReport};

use crate::error::ApiError;
use crate::state::blocking;

/// Listing prefix scanned for blobs that have no image row.
pub const DEFAULT_PREFIX: &str = "uploads/";
/// How many of the most recently modified blobs the listing pass inspects.
pub const DEFAULT_WINDOW: usize = 100;

#[derive(Clone)]
pub struct Reconciler {
    db: Arc<Database>,
    blobs: BlobStore,
    prefix: String,
    window: usize,
}

impl Reconciler {
    pub fn new(db: Arc<Database>, blobs: BlobStore) -> Self {
        Self {
            db,
            blobs,
            prefix: DEFAULT_PREFIX.to_string(),
            window: DEFAULT_WINDOW,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub async fn check(&self) -> Result<ConsistencyReport, ApiError> {
        let db = self.db.clone();
        let images = blocking(move || db.list_images())
            .await
            .map_err(consistency)?;

        // Pass 1: every image row must point at a blob that still exists.
        let mut missing_in_blob_store = Vec::new();
        for image in &images {
            let Some(key) = self.blobs.key_from_url(&image.url) else {
                debug!(image_id = %image.id, url = %image.url, "Image URL has no blob key");
                missing_in_blob_store.push(image.id.clone());
                continue;
            };

            let exists = self.blobs.exists(&key).await.map_err(|e| {
                ApiError::ConsistencyFailure(format!("probe of '{}' failed: {}", key, e))
            })?;
            if !exists {
                missing_in_blob_store.push(image.id.clone());
            }
        }

        // Pass 2: the newest blobs under the prefix must have an image row.
        let mut listed = self
            .blobs
            .list(&self.prefix)
            .await
            .map_err(|e| ApiError::ConsistencyFailure(format!("listing failed: {}", e)))?;
        listed.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        listed.truncate(self.window);

        let candidates: Vec<(String, String)> = listed
            .iter()
            .map(|meta| (meta.key.clone(), self.blobs.public_url(&meta.key)))
            .collect();
        let db = self.db.clone();
        let missing_in_database = blocking(move || {
            let mut missing = Vec::new();
            for (key, url) in candidates {
                if !db.image_exists_with_url(&url)? {
                    missing.push(key);
                }
            }
            anyhow::Ok(missing)
        })
        .await
        .map_err(consistency)?;

        let report = ConsistencyReport {
            missing_in_blob_store,
            missing_in_database,
            total_checked: images.len() + listed.len(),
        };
        info!(
            checked = report.total_checked,
            missing_blobs = report.missing_in_blob_store.len(),
            missing_rows = report.missing_in_database.len(),
            "Consistency check finished"
        );
        Ok(report)
    }

    /// Check, then delete every image row whose blob is gone. Each image is
    /// removed in its own short transaction.
    pub async fn repair(&self) -> Result<RepairReport, ApiError> {
        let report = self.check().await?;

        let mut deleted_from_database = 0;
        for image_id in report.missing_in_blob_store {
            let db = self.db.clone();
            let id = image_id.clone();
            match blocking(move || db.delete_image(&id)).await.map_err(consistency)? {
                Some(entries) => {
                    info!(image_id = %image_id, entries, "Removed image with missing blob");
                    deleted_from_database += 1;
                }
                None => debug!(image_id = %image_id, "Image already gone"),
            }
        }

        if !report.missing_in_database.is_empty() {
            warn!(
                count = report.missing_in_database.len(),
                "Blobs without image rows are reported only"
            );
        }

        Ok(RepairReport {
            deleted_from_database,
            imported_to_database: 0,
        })
    }
}

fn consistency(err: ApiError) -> ApiError {
    match err {
        ApiError::Internal(e) => ApiError::ConsistencyFailure(format!("{:#}", e)),
        other => other,
    }
}

/// Background loop running a check (or repair) on a fixed interval.
pub async fn run_reconcile_loop(reconciler: Reconciler, interval: Duration, repair: bool) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so startup is not delayed.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if repair {
            match reconciler.repair().await {
                Ok(report) => {
                    if report.deleted_from_database > 0 {
                        info!(
                            "Reconcile: removed {} image rows without blobs",
                            report.deleted_from_database
                        );
                    }
                }
                Err(e) => warn!("Reconcile error: {}", e),
            }
        } else if let Err(e) = reconciler.check().await {
            warn!("Reconcile error: {}", e);
        }
    }
}
