//! Credential and token engine.
//!
//! Issues paired access/refresh JWTs, persists them as one session row per
//! user, and validates presented tokens in two phases: signature and expiry
//! first, then a lookup for a live row holding that exact string. Login hard
//! deletes every earlier session for the user; logout only stamps
//! `revoked_at`.

use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use tracing::{debug, info};
use uuid::Uuid;

use mosaic_db::Database;
use mosaic_db::models::{TokenRow, UserRow};
use mosaic_db::queries::tokens::RotatedTokens;
use mosaic_types::api::{Claims, TokenKind};

use crate::error::AuthError;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    /// 15 minute access tokens, 30 day refresh tokens.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(30),
        }
    }
}

/// A freshly issued session: the user it belongs to, their role names, and
/// the persisted token row.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserRow,
    pub roles: Vec<String>,
    pub tokens: TokenRow,
}

/// Identity baked into every token.
struct Subject<'a> {
    user_id: &'a str,
    username: &'a str,
    phone: Option<&'a str>,
}

pub struct TokenService {
    db: Arc<Database>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(db: Arc<Database>, config: &TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            db,
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Log in by username or phone. Any earlier sessions of the user are
    /// deleted in the same transaction that stores the new one.
    pub fn issue(&self, identifier: &str, password: &str) -> Result<Session, AuthError> {
        let user = self
            .db
            .find_user_by_identifier(identifier)?
            .ok_or(AuthError::NotFound)?;

        verify_password(password, &user.password)?;

        let subject = Subject {
            user_id: &user.id,
            username: &user.username,
            phone: user.phone.as_deref(),
        };
        let now = Utc::now();
        let (access_token, access_expires_at) = self.sign(&subject, TokenKind::Access, now)?;
        let (refresh_token, refresh_expires_at) = self.sign(&subject, TokenKind::Refresh, now)?;

        let tokens = TokenRow {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
            created_at: now.timestamp_millis(),
            revoked_at: None,
        };
        let purged = self.db.replace_session(&tokens)?;
        info!(user_id = %user.id, purged, "Session issued");

        let roles = self
            .db
            .get_user_roles(&user.id)?
            .into_iter()
            .map(|role| role.name)
            .collect();

        Ok(Session {
            user,
            roles,
            tokens,
        })
    }

    /// Both phases must pass: a well-signed, unexpired access JWT, and a live
    /// session row holding exactly this string for the claimed user.
    pub fn validate_access(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.decode(token, TokenKind::Access)?;

        let now = Utc::now().timestamp_millis();
        match self.db.find_live_access_token(token, &claims.user_id, now)? {
            Some(_) => Ok(claims),
            None => {
                debug!(user_id = %claims.user_id, "Access token has no live session");
                Err(AuthError::TokenRevoked)
            }
        }
    }

    /// Trade a live refresh token for a brand-new pair, rewriting the same
    /// session row. The old strings stop validating immediately.
    pub fn rotate(&self, refresh_token: &str) -> Result<TokenRow, AuthError> {
        let claims = self.decode(refresh_token, TokenKind::Refresh)?;

        let subject = Subject {
            user_id: &claims.user_id,
            username: &claims.username,
            phone: claims.phone.as_deref(),
        };
        let now = Utc::now();
        let (access_token, access_expires_at) = self.sign(&subject, TokenKind::Access, now)?;
        let (new_refresh, refresh_expires_at) = self.sign(&subject, TokenKind::Refresh, now)?;

        let rotated = RotatedTokens {
            access_token: &access_token,
            refresh_token: &new_refresh,
            access_expires_at,
            refresh_expires_at,
        };
        let row = self
            .db
            .rotate_session(refresh_token, &claims.user_id, now.timestamp_millis(), &rotated)?
            .ok_or_else(|| {
                debug!(user_id = %claims.user_id, "Refresh token has no live session");
                AuthError::TokenRevoked
            })?;

        info!(user_id = %row.user_id, session = %row.id, "Session rotated");
        Ok(row)
    }

    /// Soft-close every session holding this refresh token. Unknown or
    /// already revoked tokens are not an error.
    pub fn revoke(&self, refresh_token: &str) -> Result<usize, AuthError> {
        let revoked = self
            .db
            .revoke_refresh_token(refresh_token, Utc::now().timestamp_millis())?;
        info!(revoked, "Refresh token revoked");
        Ok(revoked)
    }

    /// Returns the token and its expiry in Unix milliseconds.
    fn sign(
        &self,
        subject: &Subject<'_>,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<(String, i64), AuthError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let expires_at = now + ttl;

        let claims = Claims {
            user_id: subject.user_id.to_string(),
            username: subject.username.to_string(),
            phone: subject.phone.map(str::to_string),
            kind,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.into()))?;
        Ok((token, expires_at.timestamp_millis()))
    }

    fn decode(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenMalformed,
            }
        })?;

        if data.claims.kind != expected {
            debug!(?expected, got = ?data.claims.kind, "Token of the wrong kind");
            return Err(AuthError::TokenMalformed);
        }
        Ok(data.claims)
    }
}

/// Argon2id hash in PHC string form.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))
}

pub fn verify_password(password: &str, stored_hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("stored password hash unreadable: {}", e)))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_db::models::NewUser;

    const SECRET: &str = "test-secret";

    fn setup(config: TokenConfig) -> (Arc<Database>, TokenService) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let hash = hash_password("hunter22").unwrap();
        db.create_user(&NewUser {
            id: "u1",
            username: "alice",
            phone: Some("13812345678"),
            password_hash: &hash,
            name: Some("Alice"),
        })
        .unwrap();
        db.assign_role("u1", "editor").unwrap();
        let tokens = TokenService::new(db.clone(), &config);
        (db, tokens)
    }

    #[test]
    fn test_issue_then_validate() {
        let (_db, tokens) = setup(TokenConfig::new(SECRET));

        let session = tokens.issue("alice", "hunter22").unwrap();
        assert_eq!(session.roles, vec!["editor"]);

        let claims = tokens.validate_access(&session.tokens.access_token).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.phone.as_deref(), Some("13812345678"));
    }

    #[test]
    fn test_login_by_phone() {
        let (_db, tokens) = setup(TokenConfig::new(SECRET));
        let session = tokens.issue("13812345678", "hunter22").unwrap();
        assert_eq!(session.user.username, "alice");
    }

    #[test]
    fn test_login_failures() {
        let (_db, tokens) = setup(TokenConfig::new(SECRET));
        assert!(matches!(tokens.issue("bob", "hunter22"), Err(AuthError::NotFound)));
        assert!(matches!(
            tokens.issue("alice", "wrong"),
            Err(AuthError::InvalidCredential)
        ));
    }

    #[test]
    fn test_second_login_supersedes_first() {
        let (db, tokens) = setup(TokenConfig::new(SECRET));

        let first = tokens.issue("alice", "hunter22").unwrap();
        let second = tokens.issue("alice", "hunter22").unwrap();

        assert!(matches!(
            tokens.validate_access(&first.tokens.access_token),
            Err(AuthError::TokenRevoked)
        ));
        assert!(matches!(
            tokens.rotate(&first.tokens.refresh_token),
            Err(AuthError::TokenRevoked)
        ));
        assert!(tokens.validate_access(&second.tokens.access_token).is_ok());
        assert_eq!(db.count_tokens_for_user("u1").unwrap(), 1);
    }

    #[test]
    fn test_rotate_rewrites_same_row() {
        let (db, tokens) = setup(TokenConfig::new(SECRET));
        let session = tokens.issue("alice", "hunter22").unwrap();

        let rotated = tokens.rotate(&session.tokens.refresh_token).unwrap();
        assert_eq!(rotated.id, session.tokens.id);
        assert_ne!(rotated.access_token, session.tokens.access_token);
        assert_ne!(rotated.refresh_token, session.tokens.refresh_token);

        assert!(matches!(
            tokens.validate_access(&session.tokens.access_token),
            Err(AuthError::TokenRevoked)
        ));
        assert!(tokens.validate_access(&rotated.access_token).is_ok());

        // The old refresh string cannot be replayed.
        assert!(matches!(
            tokens.rotate(&session.tokens.refresh_token),
            Err(AuthError::TokenRevoked)
        ));
        assert_eq!(db.count_tokens_for_user("u1").unwrap(), 1);
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let (db, tokens) = setup(TokenConfig::new(SECRET));
        let session = tokens.issue("alice", "hunter22").unwrap();

        assert_eq!(tokens.revoke(&session.tokens.refresh_token).unwrap(), 1);
        let first = db.get_token_row(&session.tokens.id).unwrap().unwrap();
        assert!(first.revoked_at.is_some());

        assert_eq!(tokens.revoke(&session.tokens.refresh_token).unwrap(), 0);
        let second = db.get_token_row(&session.tokens.id).unwrap().unwrap();
        assert_eq!(first.revoked_at, second.revoked_at);

        assert_eq!(tokens.revoke("never-issued").unwrap(), 0);
        assert!(matches!(
            tokens.validate_access(&session.tokens.access_token),
            Err(AuthError::TokenRevoked)
        ));
        assert!(matches!(
            tokens.rotate(&session.tokens.refresh_token),
            Err(AuthError::TokenRevoked)
        ));
    }

    #[test]
    fn test_expired_access_token() {
        let mut config = TokenConfig::new(SECRET);
        config.access_ttl = Duration::minutes(-5);
        let (_db, tokens) = setup(config);

        let session = tokens.issue("alice", "hunter22").unwrap();
        assert!(matches!(
            tokens.validate_access(&session.tokens.access_token),
            Err(AuthError::TokenExpired)
        ));
        // The refresh half is still live.
        let rotated = tokens.rotate(&session.tokens.refresh_token).unwrap();
        assert_eq!(rotated.id, session.tokens.id);
    }

    #[test]
    fn test_expired_refresh_token() {
        let mut config = TokenConfig::new(SECRET);
        config.refresh_ttl = Duration::minutes(-5);
        let (_db, tokens) = setup(config);

        let session = tokens.issue("alice", "hunter22").unwrap();
        assert!(matches!(
            tokens.rotate(&session.tokens.refresh_token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_malformed_tokens() {
        let (db, tokens) = setup(TokenConfig::new(SECRET));
        let session = tokens.issue("alice", "hunter22").unwrap();

        assert!(matches!(
            tokens.validate_access("not-a-jwt"),
            Err(AuthError::TokenMalformed)
        ));
        // A refresh token is not an access token.
        assert!(matches!(
            tokens.validate_access(&session.tokens.refresh_token),
            Err(AuthError::TokenMalformed)
        ));
        // Signed with another secret.
        let foreign = TokenService::new(db, &TokenConfig::new("other-secret"));
        assert!(matches!(
            foreign.validate_access(&session.tokens.access_token),
            Err(AuthError::TokenMalformed)
        ));
    }
}
