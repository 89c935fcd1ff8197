use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection, rejection::PathRejection},
};
use tracing::info;
use uuid::Uuid;

use mosaic_db::queries::articles::NewArticle;
use mosaic_db::{Database, now_millis};
use mosaic_types::api::{Claims, Envelope};
use mosaic_types::models::{Article, ArticleImage, CreateArticleRequest, ImageIdsInput};

use crate::error::ApiError;
use crate::state::{AppState, blocking};
use crate::to_datetime;

pub fn load_article(db: &Database, id: &str) -> Result<Article, ApiError> {
    let row = db
        .get_article(id)?
        .ok_or_else(|| ApiError::NotFound("article not found".into()))?;

    let images = db
        .get_article_images(&row.id)?
        .into_iter()
        .map(|image| ArticleImage {
            id: image.image_id,
            url: image.url,
            width: image.width,
            height: image.height,
            sort_order: image.sort_order,
        })
        .collect();

    let author_name = row
        .author_name
        .filter(|n| !n.is_empty())
        .or(row.author_username)
        .unwrap_or_else(|| "unknown".to_string());

    Ok(Article {
        id: row.id,
        title: row.title,
        content: row.content,
        author_id: row.author_id,
        author_name,
        images,
        created_at: to_datetime(row.created_at),
        updated_at: to_datetime(row.updated_at),
    })
}

/// Validate and store an article with its ordered image links.
pub fn create(
    db: &Database,
    author_id: &str,
    title: &str,
    content: &str,
    image_ids: Vec<String>,
) -> Result<Article, ApiError> {
    let title = title.trim();
    let content = content.trim();
    if title.is_empty() || content.is_empty() {
        return Err(ApiError::Validation("title and content are required".into()));
    }

    // First occurrence wins; a link can only exist once.
    let mut ids: Vec<String> = Vec::with_capacity(image_ids.len());
    for id in image_ids {
        let id = id.trim().to_string();
        if !id.is_empty() && !ids.contains(&id) {
            ids.push(id);
        }
    }

    if !db.user_exists(author_id)? {
        return Err(ApiError::NotFound("author not found".into()));
    }
    if !db.images_exist(&ids)? {
        return Err(ApiError::Validation("one or more images do not exist".into()));
    }

    let id = Uuid::new_v4().to_string();
    db.create_article(&NewArticle {
        id: &id,
        title,
        content,
        author_id,
        image_ids: &ids,
        created_at: now_millis(),
    })?;
    info!(article_id = %id, author_id, images = ids.len(), "Article created");

    load_article(db, &id)
}

/// GET /article/{id}
pub async fn get_article(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Envelope<Article>>, ApiError> {
    let Path(id) = path?;
    let db = state.db.clone();
    let article = blocking(move || load_article(&db, &id)).await?;
    Ok(Json(Envelope::ok(article)))
}

/// POST /article
pub async fn create_article(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateArticleRequest>, JsonRejection>,
) -> Result<Json<Envelope<Article>>, ApiError> {
    let Json(req) = payload?;
    let title = req.title.unwrap_or_default();
    let content = req.content.unwrap_or_default();
    let image_ids = req.image_ids.map(ImageIdsInput::into_ids).unwrap_or_default();

    let db = state.db.clone();
    let article =
        blocking(move || create(&db, &claims.user_id, &title, &content, image_ids)).await?;
    Ok(Json(Envelope::ok(article)))
}
