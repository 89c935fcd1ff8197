use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::Database;
use crate::models::TokenRow;

const TOKEN_COLUMNS: &str = "id, user_id, access_token, refresh_token, access_expires_at, \
                             refresh_expires_at, created_at, revoked_at";

/// Fresh strings and expiries written over an existing session row.
pub struct RotatedTokens<'a> {
    pub access_token: &'a str,
    pub refresh_token: &'a str,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
}

impl Database {
    /// Hard-delete every session row of a user, live or not.
    pub fn purge_tokens_for_user(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| purge_tokens_for_user(conn, user_id))
    }

    /// Login: purge all of the user's sessions and insert `row`, atomically.
    /// Returns how many prior rows were purged.
    pub fn replace_session(&self, row: &TokenRow) -> Result<usize> {
        self.with_tx(|tx| {
            let purged = purge_tokens_for_user(tx, &row.user_id)?;
            insert_token_pair(tx, row)?;
            Ok(purged)
        })
    }

    /// The live row holding exactly this access token for this user.
    pub fn find_live_access_token(
        &self,
        access_token: &str,
        user_id: &str,
        now: i64,
    ) -> Result<Option<TokenRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {TOKEN_COLUMNS} FROM user_tokens
                 WHERE access_token = ?1 AND user_id = ?2
                   AND access_expires_at >= ?3 AND revoked_at IS NULL
                 LIMIT 1"
            );
            Ok(conn
                .query_row(&sql, rusqlite::params![access_token, user_id, now], map_token)
                .optional()?)
        })
    }

    /// The live row holding exactly this refresh token for this user.
    pub fn find_live_refresh_token(
        &self,
        refresh_token: &str,
        user_id: &str,
        now: i64,
    ) -> Result<Option<TokenRow>> {
        self.with_conn(|conn| query_live_refresh(conn, refresh_token, user_id, now))
    }

    /// Rotate a live session in place: same row id, new strings, new expiries.
    ///
    /// Lookup and update run in one transaction, so two concurrent rotations
    /// of the same refresh token cannot both succeed. Returns `None` when no
    /// live row matches.
    pub fn rotate_session(
        &self,
        old_refresh_token: &str,
        user_id: &str,
        now: i64,
        rotated: &RotatedTokens<'_>,
    ) -> Result<Option<TokenRow>> {
        self.with_tx(|tx| {
            let Some(mut row) = query_live_refresh(tx, old_refresh_token, user_id, now)? else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE user_tokens
                 SET access_token = ?2, refresh_token = ?3,
                     access_expires_at = ?4, refresh_expires_at = ?5
                 WHERE id = ?1",
                rusqlite::params![
                    row.id,
                    rotated.access_token,
                    rotated.refresh_token,
                    rotated.access_expires_at,
                    rotated.refresh_expires_at,
                ],
            )?;

            row.access_token = rotated.access_token.to_string();
            row.refresh_token = rotated.refresh_token.to_string();
            row.access_expires_at = rotated.access_expires_at;
            row.refresh_expires_at = rotated.refresh_expires_at;
            Ok(Some(row))
        })
    }

    /// Soft-close every row holding this refresh token. Rows already revoked
    /// keep their original timestamp, so repeating the call changes nothing.
    pub fn revoke_refresh_token(&self, refresh_token: &str, now: i64) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE user_tokens SET revoked_at = ?2
                 WHERE refresh_token = ?1 AND revoked_at IS NULL",
                rusqlite::params![refresh_token, now],
            )?)
        })
    }

    pub fn get_token_row(&self, id: &str) -> Result<Option<TokenRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {TOKEN_COLUMNS} FROM user_tokens WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], map_token).optional()?)
        })
    }

    pub fn count_tokens_for_user(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM user_tokens WHERE user_id = ?1",
                [user_id],
                |r| r.get(0),
            )?)
        })
    }
}

pub fn purge_tokens_for_user(conn: &Connection, user_id: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM user_tokens WHERE user_id = ?1", [user_id])?)
}

pub fn insert_token_pair(conn: &Connection, row: &TokenRow) -> Result<()> {
    conn.execute(
        "INSERT INTO user_tokens
            (id, user_id, access_token, refresh_token, access_expires_at,
             refresh_expires_at, created_at, revoked_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            row.id,
            row.user_id,
            row.access_token,
            row.refresh_token,
            row.access_expires_at,
            row.refresh_expires_at,
            row.created_at,
            row.revoked_at,
        ],
    )?;
    Ok(())
}

fn query_live_refresh(
    conn: &Connection,
    refresh_token: &str,
    user_id: &str,
    now: i64,
) -> Result<Option<TokenRow>> {
    let sql = format!(
        "SELECT {TOKEN_COLUMNS} FROM user_tokens
         WHERE refresh_token = ?1 AND user_id = ?2
           AND refresh_expires_at >= ?3 AND revoked_at IS NULL
         LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, rusqlite::params![refresh_token, user_id, now], map_token)
        .optional()?)
}

fn map_token(row: &Row<'_>) -> rusqlite::Result<TokenRow> {
    Ok(TokenRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        access_token: row.get(2)?,
        refresh_token: row.get(3)?,
        access_expires_at: row.get(4)?,
        refresh_expires_at: row.get(5)?,
        created_at: row.get(6)?,
        revoked_at: row.get(7)?,
    })
}
