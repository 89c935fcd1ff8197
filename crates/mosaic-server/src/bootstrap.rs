use anyhow::Context;
use tracing::info;
use uuid::Uuid;

use mosaic_api::tokens::hash_password;
use mosaic_db::Database;
use mosaic_db::models::NewUser;

/// Create the `username:password` account with the admin role unless a user
/// with that name already exists. Returns whether a user was created.
pub fn ensure_admin(db: &Database, credentials: &str) -> anyhow::Result<bool> {
    let (username, password) = credentials
        .split_once(':')
        .filter(|(u, p)| !u.is_empty() && !p.is_empty())
        .context("MOSAIC_BOOTSTRAP_ADMIN must look like username:password")?;

    if db.get_user_by_username(username)?.is_some() {
        info!(username, "Bootstrap admin already present");
        return Ok(false);
    }

    let id = Uuid::new_v4().to_string();
    let password_hash = hash_password(password)?;
    db.create_user(&NewUser {
        id: &id,
        username,
        phone: None,
        password_hash: &password_hash,
        name: Some(username),
    })?;
    db.assign_role(&id, "admin")?;

    info!(username, user_id = %id, "Bootstrap admin created");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_admin_once() {
        let db = Database::open_in_memory().unwrap();
        assert!(ensure_admin(&db, "root:pa:ss").unwrap());
        assert!(!ensure_admin(&db, "root:other").unwrap());

        let user = db.get_user_by_username("root").unwrap().unwrap();
        let roles = db.get_user_roles(&user.id).unwrap();
        assert_eq!(roles[0].name, "admin");
        // Password may itself contain ':'.
        assert!(mosaic_api::tokens::verify_password("pa:ss", &user.password).is_ok());
    }

    #[test]
    fn test_rejects_malformed_spec() {
        let db = Database::open_in_memory().unwrap();
        assert!(ensure_admin(&db, "nopassword").is_err());
        assert!(ensure_admin(&db, ":x").is_err());
    }
}
