//! Static permission catalogue.
//!
//! Codes are generated as `<category>.<action>` and seeded into the store at
//! migration time. Nothing evaluates them at request time; they are reference
//! data surfaced through the user profile.

use anyhow::Result;
use rusqlite::Connection;

pub const CATEGORIES: &[(&str, &str)] = &[
    ("article", "articles"),
    ("news", "news"),
    ("user", "users"),
    ("system", "system"),
    ("vip", "VIP benefits"),
    ("finance", "finance"),
];

pub const ACTIONS: &[(&str, &str)] = &[
    ("create", "Create"),
    ("read", "View"),
    ("edit", "Edit"),
    ("delete", "Delete"),
    ("publish", "Publish"),
    ("approve", "Approve"),
    ("ban", "Ban"),
    ("verify", "Verify"),
    ("config", "Configure"),
    ("backup", "Back up"),
    ("monitor", "Monitor"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub code: String,
    pub name: String,
    pub category: &'static str,
    pub action: &'static str,
}

/// Every category × action pair, in declaration order.
pub fn catalogue() -> Vec<Permission> {
    CATEGORIES
        .iter()
        .flat_map(|&(category, category_name)| {
            ACTIONS.iter().map(move |&(action, action_name)| Permission {
                code: format!("{}.{}", category, action),
                name: format!("{} {}", action_name, category_name),
                category,
                action,
            })
        })
        .collect()
}

/// Built-in roles, seeded alongside the catalogue.
pub const BUILTIN_ROLES: &[(&str, &str)] = &[
    ("admin", "Full access"),
    ("editor", "Content editor"),
    ("vip", "VIP member"),
    ("user", "Regular member"),
];

/// Whether a built-in role is granted `p`.
pub fn role_grants(role: &str, p: &Permission) -> bool {
    match role {
        "admin" => true,
        "editor" => p.category == "article" || p.category == "news",
        "vip" => p.category == "vip",
        "user" => p.category == "article" && (p.action == "create" || p.action == "read"),
        _ => false,
    }
}

pub fn role_id(name: &str) -> String {
    format!("role-{}", name)
}

/// Idempotent: safe to run on every startup.
pub fn seed(conn: &Connection) -> Result<()> {
    let perms = catalogue();

    let mut insert_perm = conn.prepare(
        "INSERT OR IGNORE INTO permissions (code, name, category, action) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for p in &perms {
        insert_perm.execute((&p.code, &p.name, p.category, p.action))?;
    }

    let mut insert_role =
        conn.prepare("INSERT OR IGNORE INTO roles (id, name, description) VALUES (?1, ?2, ?3)")?;
    let mut link = conn.prepare(
        "INSERT OR IGNORE INTO role_permissions (role_id, permission_code) VALUES (?1, ?2)",
    )?;
    for &(name, description) in BUILTIN_ROLES {
        let id = role_id(name);
        insert_role.execute((&id, name, description))?;
        for p in perms.iter().filter(|p| role_grants(name, p)) {
            link.execute((&id, &p.code))?;
        }
    }

    Ok(())
}
