use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Feed --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: String,
    pub image_id: String,
    /// Empty when the image row is gone.
    pub image_url: String,
    pub width: u32,
    pub height: u32,
    pub description: Option<String>,
    pub article_id: Option<String>,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

// -- Articles --

/// `imageIds` arrives as an array, a JSON-encoded array string, or one id.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ImageIdsInput {
    List(Vec<String>),
    Text(String),
}

impl ImageIdsInput {
    pub fn into_ids(self) -> Vec<String> {
        match self {
            Self::List(ids) => ids,
            Self::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    Vec::new()
                } else if let Ok(ids) = serde_json::from_str::<Vec<String>>(text) {
                    ids
                } else {
                    vec![text.to_string()]
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArticleRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image_ids: Option<ImageIdsInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleImage {
    pub id: String,
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub images: Vec<ArticleImage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Users --

#[derive(Debug, Deserialize)]
pub struct UserInfoQuery {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleInfo {
    pub name: String,
    pub permissions: Vec<String>,
}

/// Public profile. Never carries the password hash; the phone is masked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub roles: Vec<RoleInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(json: &str) -> Vec<String> {
        let req: CreateArticleRequest = serde_json::from_str(json).unwrap();
        req.image_ids.map(ImageIdsInput::into_ids).unwrap_or_default()
    }

    #[test]
    fn test_image_ids_shapes() {
        assert_eq!(ids(r#"{"imageIds":["a","b"]}"#), vec!["a", "b"]);
        assert_eq!(ids(r#"{"imageIds":"[\"a\",\"b\"]"}"#), vec!["a", "b"]);
        assert_eq!(ids(r#"{"imageIds":"a"}"#), vec!["a"]);
        assert!(ids(r#"{"imageIds":""}"#).is_empty());
        assert!(ids(r#"{}"#).is_empty());
    }
}
