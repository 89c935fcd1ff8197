use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};

use mosaic_db::Database;
use mosaic_types::api::Envelope;
use mosaic_types::models::{RoleInfo, UserInfoQuery, UserProfile};

use crate::error::ApiError;
use crate::state::{AppState, blocking};
use crate::to_datetime;

/// Keep the first three and last four characters, star the rest. Anything
/// seven characters or shorter is starred entirely.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 7 {
        return "*".repeat(chars.len());
    }

    let hidden = chars.len() - 7;
    let mut masked: String = chars[..3].iter().collect();
    masked.push_str(&"*".repeat(hidden));
    masked.extend(&chars[chars.len() - 4..]);
    masked
}

pub fn profile(db: &Database, user_id: &str) -> Result<UserProfile, ApiError> {
    let user = db
        .get_user_by_id(user_id)?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    let roles = db
        .get_user_roles(&user.id)?
        .into_iter()
        .map(|role| RoleInfo {
            name: role.name,
            permissions: role.permissions,
        })
        .collect();

    Ok(UserProfile {
        name: user
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| user.username.clone()),
        id: user.id,
        username: user.username,
        avatar: user.avatar,
        bio: user.bio,
        phone: user.phone.as_deref().map(mask_phone),
        roles,
        created_at: to_datetime(user.created_at),
        updated_at: to_datetime(user.updated_at),
    })
}

/// GET /user/info?id=
pub async fn info(
    State(state): State<AppState>,
    query: Result<Query<UserInfoQuery>, QueryRejection>,
) -> Result<Json<Envelope<UserProfile>>, ApiError> {
    let Query(query) = query?;
    let id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("id is required".into()))?;

    let db = state.db.clone();
    let user = blocking(move || profile(&db, &id)).await?;
    Ok(Json(Envelope::ok(user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_db::models::NewUser;

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("13812345678"), "138****5678");
        assert_eq!(mask_phone("+8613812345678"), "+86*******5678");
        assert_eq!(mask_phone("1234567"), "*******");
        assert_eq!(mask_phone(""), "");
    }

    #[test]
    fn test_profile_hides_secrets() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&NewUser {
            id: "u1",
            username: "alice",
            phone: Some("13812345678"),
            password_hash: "$argon2id$secret",
            name: None,
        })
        .unwrap();
        db.assign_role("u1", "user").unwrap();

        let profile = profile(&db, "u1").unwrap();
        assert_eq!(profile.name, "alice");
        assert_eq!(profile.phone.as_deref(), Some("138****5678"));
        assert_eq!(profile.roles.len(), 1);
        assert_eq!(
            profile.roles[0].permissions,
            vec!["article.create", "article.read"]
        );

        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("13812345678"));
    }

    #[test]
    fn test_unknown_user() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(profile(&db, "nope"), Err(ApiError::NotFound(_))));
    }
}
