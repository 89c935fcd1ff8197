/// Database row types; these map directly to SQLite rows.
/// Distinct from mosaic-types API models to keep the DB layer independent.
/// Timestamps are Unix milliseconds.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub phone: Option<String>,
    pub password: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct NewUser<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub phone: Option<&'a str>,
    pub password_hash: &'a str,
    pub name: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct RoleWithPermissions {
    pub name: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TokenRow {
    pub id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
    pub created_at: i64,
    pub revoked_at: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageMeta {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ImageRow {
    pub id: String,
    pub url: String,
    pub meta: ImageMeta,
    pub created_at: i64,
}

pub struct NewFeedEntry<'a> {
    pub id: &'a str,
    pub image_id: &'a str,
    pub article_id: Option<&'a str>,
    pub description: Option<&'a str>,
    pub sort_order: i64,
    pub created_at: i64,
}

/// A feed entry LEFT JOINed to its image. Image columns are `None` when the
/// referenced image row is gone.
#[derive(Debug, Clone)]
pub struct FeedEntryRow {
    pub id: String,
    pub image_id: String,
    pub article_id: Option<String>,
    pub description: Option<String>,
    pub sort_order: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub image_url: Option<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ArticleRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub author_username: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct ArticleImageRow {
    pub image_id: String,
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sort_order: i64,
}
