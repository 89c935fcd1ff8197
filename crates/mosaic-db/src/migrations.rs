use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::permissions;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        // No ON DELETE CASCADE anywhere: image deletion walks its dependents
        // explicitly so the request path and the reconciler share one shape.
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                phone       TEXT UNIQUE,
                password    TEXT NOT NULL,
                name        TEXT,
                avatar      TEXT,
                bio         TEXT,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE roles (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE permissions (
                code        TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                category    TEXT NOT NULL,
                action      TEXT NOT NULL
            );

            CREATE TABLE role_permissions (
                role_id         TEXT NOT NULL REFERENCES roles(id),
                permission_code TEXT NOT NULL REFERENCES permissions(code),
                PRIMARY KEY (role_id, permission_code)
            );

            CREATE TABLE user_roles (
                user_id     TEXT NOT NULL REFERENCES users(id),
                role_id     TEXT NOT NULL REFERENCES roles(id),
                PRIMARY KEY (user_id, role_id)
            );

            CREATE TABLE user_tokens (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id),
                access_token        TEXT NOT NULL,
                refresh_token       TEXT NOT NULL,
                access_expires_at   INTEGER NOT NULL,
                refresh_expires_at  INTEGER NOT NULL,
                created_at          INTEGER NOT NULL,
                revoked_at          INTEGER
            );

            CREATE INDEX idx_user_tokens_user ON user_tokens(user_id);
            CREATE INDEX idx_user_tokens_access ON user_tokens(access_token);
            CREATE INDEX idx_user_tokens_refresh ON user_tokens(refresh_token);

            CREATE TABLE images (
                id          TEXT PRIMARY KEY,
                url         TEXT NOT NULL,
                width       INTEGER,
                height      INTEGER,
                filename    TEXT,
                mime_type   TEXT,
                size        INTEGER,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_images_url ON images(url);

            CREATE TABLE articles (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                content     TEXT NOT NULL,
                author_id   TEXT NOT NULL REFERENCES users(id),
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE article_images (
                article_id  TEXT NOT NULL REFERENCES articles(id),
                image_id    TEXT NOT NULL REFERENCES images(id),
                sort_order  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (article_id, image_id)
            );

            CREATE TABLE feed_entries (
                id          TEXT PRIMARY KEY,
                image_id    TEXT NOT NULL REFERENCES images(id),
                article_id  TEXT REFERENCES articles(id),
                description TEXT,
                sort_order  INTEGER NOT NULL DEFAULT 0,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_feed_entries_order ON feed_entries(sort_order, created_at DESC);
            CREATE INDEX idx_feed_entries_image ON feed_entries(image_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    permissions::seed(conn)?;

    info!("Database migrations complete");
    Ok(())
}
