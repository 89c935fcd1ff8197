//! API-key guarded maintenance routes.

use axum::{
    Json,
    extract::{Path, State, rejection::PathRejection},
};

use mosaic_types::api::{ConsistencyReport, DeleteImageResponse, Envelope, RepairReport};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /admin/consistency
pub async fn check(
    State(state): State<AppState>,
) -> Result<Json<Envelope<ConsistencyReport>>, ApiError> {
    let report = state.reconciler.check().await?;
    Ok(Json(Envelope::ok(report)))
}

/// POST /admin/consistency/repair
pub async fn repair(
    State(state): State<AppState>,
) -> Result<Json<Envelope<RepairReport>>, ApiError> {
    let report = state.reconciler.repair().await?;
    Ok(Json(Envelope::ok(report)))
}

/// DELETE /admin/images/{id}
pub async fn delete_image(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Envelope<DeleteImageResponse>>, ApiError> {
    let Path(image_id) = path?;
    let deleted_feed_entries = state.images.delete(&image_id).await?;
    Ok(Json(Envelope::ok(DeleteImageResponse {
        image_id,
        deleted_feed_entries,
    })))
}
