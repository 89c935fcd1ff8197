use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// Which half of a token pair a JWT is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims carried by both access and refresh tokens. This is the claim
/// set returned by `GET /auth/check-token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Unique per token so that two tokens minted in the same second differ.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

// -- Envelopes --

/// Success envelope: `{code, success?, message?, data?}`. Only the auth
/// endpoints send `success`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            success: None,
            message: None,
            data: Some(data),
        }
    }

    pub fn with_success(mut self) -> Self {
        self.success = Some(true);
        self
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: 200,
            success: None,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Error envelope: `{code, message, error:{message, code}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub message: String,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    /// `identifier` wins over `username`; blank values count as absent.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier
            .as_deref()
            .or(self.username.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserKeyInfo {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix milliseconds.
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
    pub user_key_info: UserKeyInfo,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
    pub token: Option<String>,
}

impl RefreshRequest {
    pub fn token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .or(self.token.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

// -- Object storage --

/// JSON upload body; `file` is base64, optionally as a `data:` URL.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadJsonRequest {
    pub file: Option<String>,
    pub file_name: Option<String>,
    pub folder: Option<String>,
    pub article_id: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    /// Empty when the upload was not a recognised image.
    pub image_id: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_entry_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub expires: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub url: String,
    pub expires: u64,
}

// -- Admin --

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub missing_in_blob_store: Vec<String>,
    pub missing_in_database: Vec<String>,
    pub total_checked: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub deleted_from_database: usize,
    pub imported_to_database: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteImageResponse {
    pub image_id: String,
    pub deleted_feed_entries: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_wire_names() {
        let claims = Claims {
            user_id: "u1".into(),
            username: "alice".into(),
            phone: None,
            kind: TokenKind::Access,
            jti: "j".into(),
            iat: 1,
            exp: 2,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["type"], "access");
        assert!(json.get("phone").is_none());
    }

    #[test]
    fn test_login_identifier_precedence() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"identifier":"13800000000","username":"bob","password":"x"}"#)
                .unwrap();
        assert_eq!(req.identifier(), Some("13800000000"));

        let req: LoginRequest = serde_json::from_str(r#"{"username":" bob ","password":"x"}"#).unwrap();
        assert_eq!(req.identifier(), Some("bob"));

        let req: LoginRequest = serde_json::from_str(r#"{"identifier":"  "}"#).unwrap();
        assert_eq!(req.identifier(), None);
    }

    #[test]
    fn test_refresh_accepts_either_field() {
        let a: RefreshRequest = serde_json::from_str(r#"{"refresh_token":"r"}"#).unwrap();
        let b: RefreshRequest = serde_json::from_str(r#"{"token":"r"}"#).unwrap();
        assert_eq!(a.token(), Some("r"));
        assert_eq!(b.token(), Some("r"));
    }

    #[test]
    fn test_login_response_is_camel_case() {
        let res = LoginResponse {
            access_token: "a".into(),
            refresh_token: "r".into(),
            access_expires_at: 1,
            refresh_expires_at: 2,
            user_key_info: UserKeyInfo {
                id: "u".into(),
                name: "n".into(),
                avatar: None,
                roles: vec![],
            },
        };
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["userKeyInfo"]["id"], "u");
    }
}
