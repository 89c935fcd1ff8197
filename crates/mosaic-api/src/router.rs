use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use chrono::Utc;

use mosaic_types::api::HealthResponse;

use crate::middleware::{require_api_key, require_auth};
use crate::state::AppState;
use crate::{admin, articles, auth, feed, files, users};

/// Every route, mounted under `/api`, plus `/health`. Logging and CORS
/// layers are left to the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/check-token", get(auth::check_token))
        .route("/auth/refresh-token", post(auth::refresh_token))
        .route("/auth/logout", post(auth::logout))
        .route("/article/{id}", get(articles::get_article))
        .route("/waterfall", get(feed::list))
        .route("/user/info", get(users::info));

    // Base64 JSON bodies are a third larger than the file they carry.
    let body_limit = state.upload_max_bytes.saturating_mul(2);
    let protected_routes = Router::new()
        .route("/article", post(articles::create_article))
        .route("/oss/upload", post(files::upload))
        .route("/oss/download/{*file_key}", get(files::download_url))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let mut api = public_routes.merge(protected_routes);

    if state.api_key.is_some() {
        let admin_routes = Router::new()
            .route("/admin/consistency", get(admin::check))
            .route("/admin/consistency/repair", post(admin::repair))
            .route("/admin/images/{id}", delete(admin::delete_image))
            .layer(middleware::from_fn_with_state(state.clone(), require_api_key));
        api = api.merge(admin_routes);
    }

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        timestamp: Utc::now(),
    })
}
