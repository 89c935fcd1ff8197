use anyhow::Result;
use rusqlite::OptionalExtension;

use crate::Database;
use crate::models::{ArticleImageRow, ArticleRow};

pub struct NewArticle<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub author_id: &'a str,
    /// Linked in the given order; position becomes the link's sort order.
    pub image_ids: &'a [String],
    pub created_at: i64,
}

impl Database {
    /// Insert the article and its ordered image links in one transaction.
    pub fn create_article(&self, article: &NewArticle<'_>) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO articles (id, title, content, author_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![
                    article.id,
                    article.title,
                    article.content,
                    article.author_id,
                    article.created_at,
                ],
            )?;

            let mut link = tx.prepare(
                "INSERT INTO article_images (article_id, image_id, sort_order) VALUES (?1, ?2, ?3)",
            )?;
            for (index, image_id) in article.image_ids.iter().enumerate() {
                link.execute(rusqlite::params![article.id, image_id, index as i64])?;
            }
            Ok(())
        })
    }

    /// Article joined to its author's display columns.
    pub fn get_article(&self, id: &str) -> Result<Option<ArticleRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT a.id, a.title, a.content, a.author_id, u.name, u.username,
                            a.created_at, a.updated_at
                     FROM articles a
                     LEFT JOIN users u ON u.id = a.author_id
                     WHERE a.id = ?1",
                    [id],
                    |row| {
                        Ok(ArticleRow {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            content: row.get(2)?,
                            author_id: row.get(3)?,
                            author_name: row.get(4)?,
                            author_username: row.get(5)?,
                            created_at: row.get(6)?,
                            updated_at: row.get(7)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    pub fn get_article_images(&self, article_id: &str) -> Result<Vec<ArticleImageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT i.id, i.url, i.width, i.height, ai.sort_order
                 FROM article_images ai
                 JOIN images i ON i.id = ai.image_id
                 WHERE ai.article_id = ?1
                 ORDER BY ai.sort_order ASC",
            )?;
            let rows = stmt
                .query_map([article_id], |row| {
                    Ok(ArticleImageRow {
                        image_id: row.get(0)?,
                        url: row.get(1)?,
                        width: row.get(2)?,
                        height: row.get(3)?,
                        sort_order: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn article_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.prepare("SELECT 1 FROM articles WHERE id = ?1")?.exists([id])?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageMeta, ImageRow, NewUser};

    #[test]
    fn test_article_images_keep_given_order() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&NewUser {
            id: "u1",
            username: "alice",
            phone: None,
            password_hash: "hash",
            name: Some("Alice"),
        })
        .unwrap();
        for id in ["i1", "i2", "i3"] {
            db.insert_image_with_feed_entry(
                &ImageRow {
                    id: id.into(),
                    url: format!("http://b/{id}.png"),
                    meta: ImageMeta::default(),
                    created_at: 0,
                },
                None,
            )
            .unwrap();
        }

        let ids = vec!["i3".to_string(), "i1".to_string(), "i2".to_string()];
        db.create_article(&NewArticle {
            id: "a1",
            title: "t",
            content: "c",
            author_id: "u1",
            image_ids: &ids,
            created_at: 0,
        })
        .unwrap();

        let article = db.get_article("a1").unwrap().unwrap();
        assert_eq!(article.author_name.as_deref(), Some("Alice"));

        let images: Vec<String> = db
            .get_article_images("a1")
            .unwrap()
            .into_iter()
            .map(|r| r.image_id)
            .collect();
        assert_eq!(images, ids);
        assert!(db.article_exists("a1").unwrap());
        assert!(!db.article_exists("a2").unwrap());
    }

    #[test]
    fn test_unknown_image_aborts_whole_article() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&NewUser {
            id: "u1",
            username: "alice",
            phone: None,
            password_hash: "hash",
            name: None,
        })
        .unwrap();

        let ids = vec!["ghost".to_string()];
        let result = db.create_article(&NewArticle {
            id: "a1",
            title: "t",
            content: "c",
            author_id: "u1",
            image_ids: &ids,
            created_at: 0,
        });
        assert!(result.is_err());
        assert!(db.get_article("a1").unwrap().is_none());
    }
}
