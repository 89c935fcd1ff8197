use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::models::{NewUser, RoleWithPermissions, UserRow};
use crate::permissions::role_id;
use crate::{Database, now_millis};

const USER_COLUMNS: &str =
    "id, username, phone, password, name, avatar, bio, created_at, updated_at";

impl Database {
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn(|conn| insert_user(conn, user))
    }

    /// Resolve a login identifier against username first, then phone.
    ///
    /// Username and phone live in separate UNIQUE columns, so one user's phone
    /// can equal another user's username. When that happens the username match
    /// wins, then the older account.
    pub fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE username = ?1 OR phone = ?1
                 ORDER BY (username = ?1) DESC, created_at ASC
                 LIMIT 1"
            );
            Ok(conn.query_row(&sql, [identifier], map_user).optional()?)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
            Ok(conn.query_row(&sql, [username], map_user).optional()?)
        })
    }

    /// Attach a built-in role by name. Re-assigning is a no-op.
    pub fn assign_role(&self, user_id: &str, role_name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?1, ?2)",
                (user_id, role_id(role_name)),
            )?;
            Ok(())
        })
    }

    /// Roles of a user with their permission codes, both sorted by name.
    pub fn get_user_roles(&self, user_id: &str) -> Result<Vec<RoleWithPermissions>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.name, rp.permission_code
                 FROM user_roles ur
                 JOIN roles r ON r.id = ur.role_id
                 LEFT JOIN role_permissions rp ON rp.role_id = r.id
                 WHERE ur.user_id = ?1
                 ORDER BY r.name, rp.permission_code",
            )?;

            let pairs = stmt
                .query_map([user_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut roles: Vec<RoleWithPermissions> = Vec::new();
            for (name, code) in pairs {
                if roles.last().map(|r| r.name != name).unwrap_or(true) {
                    roles.push(RoleWithPermissions {
                        name,
                        permissions: Vec::new(),
                    });
                }
                if let (Some(code), Some(role)) = (code, roles.last_mut()) {
                    role.permissions.push(code);
                }
            }
            Ok(roles)
        })
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |r| r.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }
}

pub fn insert_user(conn: &Connection, user: &NewUser<'_>) -> Result<()> {
    let now = now_millis();
    conn.execute(
        "INSERT INTO users (id, username, phone, password, name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        rusqlite::params![user.id, user.username, user.phone, user.password_hash, user.name, now],
    )?;
    Ok(())
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_user).optional()?)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        phone: row.get(2)?,
        password: row.get(3)?,
        name: row.get(4)?,
        avatar: row.get(5)?,
        bio: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user<'a>(id: &'a str, username: &'a str, phone: Option<&'a str>) -> NewUser<'a> {
        NewUser {
            id,
            username,
            phone,
            password_hash: "hash",
            name: None,
        }
    }

    #[test]
    fn test_identifier_matches_username_or_phone() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("u1", "alice", Some("13800000001"))).unwrap();

        assert_eq!(db.find_user_by_identifier("alice").unwrap().unwrap().id, "u1");
        assert_eq!(db.find_user_by_identifier("13800000001").unwrap().unwrap().id, "u1");
        assert!(db.find_user_by_identifier("bob").unwrap().is_none());
    }

    #[test]
    fn test_identifier_collision_prefers_username() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("u1", "alice", Some("carol"))).unwrap();
        db.create_user(&user("u2", "carol", None)).unwrap();

        assert_eq!(db.find_user_by_identifier("carol").unwrap().unwrap().id, "u2");
    }

    #[test]
    fn test_roles_carry_permission_codes() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("u1", "alice", None)).unwrap();
        db.assign_role("u1", "user").unwrap();
        db.assign_role("u1", "vip").unwrap();
        db.assign_role("u1", "user").unwrap();

        let roles = db.get_user_roles("u1").unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].name, "user");
        assert_eq!(roles[0].permissions, vec!["article.create", "article.read"]);
        assert_eq!(roles[1].name, "vip");
        assert!(roles[1].permissions.iter().all(|c| c.starts_with("vip.")));
    }
}
