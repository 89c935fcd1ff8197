//! Feed query service: paginated, read-only view of feed entries joined to
//! their images.

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::Deserialize;

use mosaic_db::Database;
use mosaic_types::api::Envelope;
use mosaic_types::models::{FeedItem, FeedPage};

use crate::error::ApiError;
use crate::state::{AppState, blocking};
use crate::to_datetime;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
/// SQLite binds LIMIT/OFFSET as signed 64-bit integers.
pub const MAX_PAGE_SIZE: u64 = i64::MAX as u64;

/// One page of the feed, ordered by sort rank ascending then newest first.
/// `total` counts every entry regardless of the window.
pub fn list_page(db: &Database, page: u64, page_size: u64) -> anyhow::Result<FeedPage> {
    let page = page.max(1);
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

    // A window starting past anything SQLite can address is past the end.
    let offset = (page - 1)
        .checked_mul(page_size)
        .filter(|&offset| i64::try_from(offset).is_ok());
    let rows = match offset {
        Some(offset) => db.list_feed_entries(offset, page_size)?,
        None => Vec::new(),
    };
    let total = db.count_feed_entries()?;

    let items = rows
        .into_iter()
        .map(|row| FeedItem {
            id: row.id,
            image_id: row.image_id,
            image_url: row.image_url.unwrap_or_default(),
            width: row.image_width.unwrap_or(0),
            height: row.image_height.unwrap_or(0),
            description: row.description,
            article_id: row.article_id,
            sort_order: row.sort_order,
            created_at: to_datetime(row.created_at),
            updated_at: to_datetime(row.updated_at),
        })
        .collect();

    Ok(FeedPage {
        items,
        total,
        page,
        page_size,
        total_pages: total.div_ceil(page_size),
    })
}

/// Query values arrive as text; anything that is not a positive integer falls
/// back to the default.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
}

fn positive_or(value: Option<&str>, default: u64) -> u64 {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&n| n >= 1)
        .unwrap_or(default)
}

/// GET /waterfall?page=&pageSize=
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<FeedQuery>, QueryRejection>,
) -> Result<Json<Envelope<FeedPage>>, ApiError> {
    let Query(query) = query?;
    let page = positive_or(query.page.as_deref(), 1);
    let page_size = positive_or(query.page_size.as_deref(), DEFAULT_PAGE_SIZE);

    let db = state.db.clone();
    let feed = blocking(move || list_page(&db, page, page_size)).await?;
    Ok(Json(Envelope::ok(feed)))
}
