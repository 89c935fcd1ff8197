use anyhow::Result;
use rusqlite::Connection;

use crate::Database;
use crate::models::{FeedEntryRow, NewFeedEntry};

impl Database {
    pub fn insert_feed_entry(&self, entry: &NewFeedEntry<'_>) -> Result<()> {
        self.with_conn(|conn| insert_feed_entry(conn, entry))
    }

    /// One window of the feed, ordered by sort rank ascending then newest
    /// first. Entries whose image row is missing come back with empty image
    /// columns instead of being dropped.
    pub fn list_feed_entries(&self, offset: u64, limit: u64) -> Result<Vec<FeedEntryRow>> {
        let Ok(offset) = i64::try_from(offset) else {
            return Ok(Vec::new());
        };
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, f.image_id, f.article_id, f.description, f.sort_order,
                        f.created_at, f.updated_at, i.url, i.width, i.height
                 FROM feed_entries f
                 LEFT JOIN images i ON i.id = f.image_id
                 ORDER BY f.sort_order ASC, f.created_at DESC, f.id ASC
                 LIMIT ?1 OFFSET ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![limit, offset], |row| {
                    Ok(FeedEntryRow {
                        id: row.get(0)?,
                        image_id: row.get(1)?,
                        article_id: row.get(2)?,
                        description: row.get(3)?,
                        sort_order: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                        image_url: row.get(7)?,
                        image_width: row.get(8)?,
                        image_height: row.get(9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Unfiltered count of every feed entry.
    pub fn count_feed_entries(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM feed_entries", [], |r| r.get(0))?;
            Ok(n as u64)
        })
    }
}

pub fn insert_feed_entry(conn: &Connection, entry: &NewFeedEntry<'_>) -> Result<()> {
    conn.execute(
        "INSERT INTO feed_entries
            (id, image_id, article_id, description, sort_order, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        rusqlite::params![
            entry.id,
            entry.image_id,
            entry.article_id,
            entry.description,
            entry.sort_order,
            entry.created_at,
        ],
    )?;
    Ok(())
}
