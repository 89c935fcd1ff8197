use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::debug;

use crate::Database;
use crate::models::{ImageMeta, ImageRow, NewFeedEntry};
use crate::queries::feed::insert_feed_entry;

const IMAGE_COLUMNS: &str = "id, url, width, height, filename, mime_type, size, created_at";

impl Database {
    /// Insert an image and, optionally, its feed entry as one unit.
    pub fn insert_image_with_feed_entry(
        &self,
        image: &ImageRow,
        feed_entry: Option<&NewFeedEntry<'_>>,
    ) -> Result<()> {
        self.with_tx(|tx| {
            insert_image(tx, image)?;
            if let Some(entry) = feed_entry {
                insert_feed_entry(tx, entry)?;
            }
            Ok(())
        })
    }

    /// Delete an image together with every row that references it.
    /// Returns `None` when the image does not exist, otherwise the number of
    /// feed entries removed with it.
    pub fn delete_image(&self, image_id: &str) -> Result<Option<usize>> {
        self.with_tx(|tx| delete_image_cascade(tx, image_id))
    }

    pub fn get_image(&self, id: &str) -> Result<Option<ImageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], map_image).optional()?)
        })
    }

    pub fn list_images(&self) -> Result<Vec<ImageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {IMAGE_COLUMNS} FROM images ORDER BY created_at, id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_image)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn image_exists_with_url(&self, url: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM images WHERE url = ?1 LIMIT 1", [url], |r| r.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// True when every id in `ids` names an existing image.
    pub fn images_exist(&self, ids: &[String]) -> Result<bool> {
        if ids.is_empty() {
            return Ok(true);
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT 1 FROM images WHERE id = ?1")?;
            for id in ids {
                if !stmt.exists([id])? {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    pub fn count_images(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM images", [], |r| r.get(0))?))
    }
}

pub fn insert_image(conn: &Connection, image: &ImageRow) -> Result<()> {
    conn.execute(
        "INSERT INTO images (id, url, width, height, filename, mime_type, size, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            image.id,
            image.url,
            image.meta.width,
            image.meta.height,
            image.meta.filename,
            image.meta.mime_type,
            image.meta.size.map(|s| s as i64),
            image.created_at,
        ],
    )?;
    Ok(())
}

/// Explicit cascade: feed entries, article links, then the image itself.
pub fn delete_image_cascade(conn: &Connection, image_id: &str) -> Result<Option<usize>> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM images WHERE id = ?1", [image_id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }

    let entries = conn.execute("DELETE FROM feed_entries WHERE image_id = ?1", [image_id])?;
    let links = conn.execute("DELETE FROM article_images WHERE image_id = ?1", [image_id])?;
    conn.execute("DELETE FROM images WHERE id = ?1", [image_id])?;

    debug!(image_id, entries, links, "Image deleted with dependents");
    Ok(Some(entries))
}

fn map_image(row: &Row<'_>) -> rusqlite::Result<ImageRow> {
    Ok(ImageRow {
        id: row.get(0)?,
        url: row.get(1)?,
        meta: ImageMeta {
            width: row.get(2)?,
            height: row.get(3)?,
            filename: row.get(4)?,
            mime_type: row.get(5)?,
            size: row.get::<_, Option<i64>>(6)?.map(|s| s as u64),
        },
        created_at: row.get(7)?,
    })
}
