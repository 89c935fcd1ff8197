//! Image ingestion pipeline.
//!
//! Blob write first, then metadata, then one relational transaction for the
//! image row and its optional feed entry. The blob write is outside that
//! transaction; a crash in between leaves an orphaned blob that the
//! reconciler reports as missing from the database.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use image::ImageReader;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mosaic_blob::{BlobStore, keys};
use mosaic_db::models::{ImageMeta, ImageRow, NewFeedEntry};
use mosaic_db::{Database, now_millis};

use crate::error::ApiError;
use crate::state::blocking;

/// Extensions treated as raster images. Anything else is stored as a plain
/// file with no image row.
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];

/// Folder used when the caller names none.
pub const DEFAULT_FOLDER: &str = "uploads";

pub struct UploadRequest {
    pub bytes: Bytes,
    pub filename: String,
    pub folder: Option<String>,
    /// Article the new feed entry should point at.
    pub feed_target: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub key: String,
    pub url: String,
    /// `None` for non-image uploads.
    pub image_id: Option<String>,
    pub feed_entry_id: Option<String>,
}

#[derive(Clone)]
pub struct ImageService {
    db: Arc<Database>,
    blobs: BlobStore,
}

impl ImageService {
    pub fn new(db: Arc<Database>, blobs: BlobStore) -> Self {
        Self { db, blobs }
    }

    pub async fn upload(&self, req: UploadRequest) -> Result<UploadOutcome, ApiError> {
        if req.bytes.is_empty() {
            return Err(ApiError::Validation("file is empty".into()));
        }

        let folder = req
            .folder
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FOLDER);
        let key = keys::generate_key(Some(folder), &req.filename)
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        let is_image = is_image_filename(&req.filename);
        let feed_target = req.feed_target.filter(|id| !id.trim().is_empty());

        // Reject a bad feed target before anything reaches the blob store.
        if let (true, Some(article_id)) = (is_image, feed_target.clone()) {
            let db = self.db.clone();
            if !blocking(move || db.article_exists(&article_id)).await? {
                return Err(ApiError::NotFound("article not found".into()));
            }
        }

        self.blobs
            .put(&key, req.bytes.clone())
            .await
            .map_err(|e| ApiError::UploadFailure(e.to_string()))?;
        let url = self.blobs.public_url(&key);

        if !is_image {
            info!(key = %key, size = req.bytes.len(), "Stored non-image upload");
            return Ok(UploadOutcome {
                key,
                url,
                image_id: None,
                feed_entry_id: None,
            });
        }

        let image_id = Uuid::new_v4().to_string();
        let feed_entry_id = feed_target.as_ref().map(|_| Uuid::new_v4().to_string());

        let db = self.db.clone();
        let bytes = req.bytes;
        let filename = req.filename;
        let description = req.description;
        let row_url = url.clone();
        let row_image_id = image_id.clone();
        let row_entry_id = feed_entry_id.clone();
        let stored = blocking(move || {
            let image = ImageRow {
                id: row_image_id,
                url: row_url,
                meta: probe_image(&bytes, &filename),
                created_at: now_millis(),
            };
            let entry = match (&row_entry_id, &feed_target) {
                (Some(id), Some(article_id)) => Some(NewFeedEntry {
                    id: id.as_str(),
                    image_id: &image.id,
                    article_id: Some(article_id.as_str()),
                    description: description.as_deref(),
                    sort_order: 0,
                    created_at: image.created_at,
                }),
                _ => None,
            };
            db.insert_image_with_feed_entry(&image, entry.as_ref())
        })
        .await;

        if let Err(e) = stored {
            warn!(key = %key, "Blob stored but database write failed; left for the reconciler");
            return Err(e);
        }

        info!(key = %key, image_id = %image_id, feed_entry = ?feed_entry_id, "Image ingested");
        Ok(UploadOutcome {
            key,
            url,
            image_id: Some(image_id),
            feed_entry_id,
        })
    }

    /// Remove an image and every feed entry and article link pointing at it.
    /// The blob itself is left in place. Returns the number of feed entries
    /// removed.
    pub async fn delete(&self, image_id: &str) -> Result<usize, ApiError> {
        let db = self.db.clone();
        let id = image_id.to_string();
        match blocking(move || db.delete_image(&id)).await? {
            Some(entries) => {
                info!(image_id, entries, "Image deleted");
                Ok(entries)
            }
            None => Err(ApiError::NotFound("image not found".into())),
        }
    }
}

pub fn is_image_filename(filename: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&keys::extension_of(filename).as_str())
}

/// Pixel size, format and byte length of an encoded image. Undecodable
/// content yields metadata with only the filename set.
pub fn probe_image(bytes: &[u8], filename: &str) -> ImageMeta {
    let mut meta = ImageMeta {
        filename: Some(filename.to_string()),
        ..Default::default()
    };

    let reader = match ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
        Ok(reader) => reader,
        Err(e) => {
            warn!(filename, "Could not sniff image format: {}", e);
            return meta;
        }
    };
    let Some(format) = reader.format() else {
        warn!(filename, "Unrecognised image format");
        return meta;
    };

    match reader.into_dimensions() {
        Ok((width, height)) => {
            meta.width = Some(width);
            meta.height = Some(height);
            meta.mime_type = Some(format.to_mime_type().to_string());
            meta.size = Some(bytes.len() as u64);
            debug!(filename, width, height, "Image metadata decoded");
        }
        Err(e) => warn!(filename, "Failed to read image dimensions: {}", e),
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use mosaic_db::models::NewUser;
    use mosaic_db::queries::articles::NewArticle;

    fn png(width: u32, height: u32) -> Bytes {
        let mut out = Cursor::new(Vec::new());
        RgbImage::new(width, height)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        Bytes::from(out.into_inner())
    }

    fn service() -> (Arc<Database>, BlobStore, ImageService) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let blobs = BlobStore::memory("https://media.example.com").unwrap();
        let images = ImageService::new(db.clone(), blobs.clone());
        (db, blobs, images)
    }

    fn seed_article(db: &Database) {
        db.create_user(&NewUser {
            id: "u1",
            username: "alice",
            phone: None,
            password_hash: "x",
            name: None,
        })
        .unwrap();
        db.create_article(&NewArticle {
            id: "a1",
            title: "t",
            content: "c",
            author_id: "u1",
            image_ids: &[],
            created_at: 0,
        })
        .unwrap();
    }

    fn request(bytes: Bytes, filename: &str) -> UploadRequest {
        UploadRequest {
            bytes,
            filename: filename.into(),
            folder: None,
            feed_target: None,
            description: None,
        }
    }

    #[test]
    fn test_probe_png() {
        let meta = probe_image(&png(7, 3), "a.png");
        assert_eq!(meta.width, Some(7));
        assert_eq!(meta.height, Some(3));
        assert_eq!(meta.mime_type.as_deref(), Some("image/png"));
        assert!(meta.size.unwrap() > 0);
    }

    #[test]
    fn test_probe_garbage_degrades() {
        let meta = probe_image(b"definitely not a png", "broken.png");
        assert_eq!(meta.filename.as_deref(), Some("broken.png"));
        assert_eq!(meta.width, None);
        assert_eq!(meta.mime_type, None);
    }

    #[test]
    fn test_image_extension_detection() {
        assert!(is_image_filename("A.JPG"));
        assert!(is_image_filename("b.webp"));
        assert!(!is_image_filename("doc.pdf"));
        assert!(!is_image_filename("png"));
    }

    #[tokio::test]
    async fn test_png_upload_records_dimensions() {
        let (db, blobs, images) = service();

        let out = images.upload(request(png(12, 5), "photo.png")).await.unwrap();
        assert!(out.key.starts_with("uploads/"));
        assert!(blobs.exists(&out.key).await.unwrap());

        let row = db.get_image(out.image_id.as_deref().unwrap()).unwrap().unwrap();
        assert_eq!(row.url, out.url);
        assert_eq!(row.meta.width, Some(12));
        assert_eq!(row.meta.height, Some(5));
        assert!(out.feed_entry_id.is_none());
    }

    #[tokio::test]
    async fn test_non_image_upload_has_no_row() {
        let (db, blobs, images) = service();

        let out = images
            .upload(request(Bytes::from_static(b"%PDF-1.4"), "doc.pdf"))
            .await
            .unwrap();
        assert!(out.image_id.is_none());
        assert!(blobs.exists(&out.key).await.unwrap());
        assert_eq!(db.count_images().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_image_still_recorded() {
        let (db, _blobs, images) = service();

        let out = images
            .upload(request(Bytes::from_static(b"garbage"), "broken.jpg"))
            .await
            .unwrap();
        let row = db.get_image(out.image_id.as_deref().unwrap()).unwrap().unwrap();
        assert_eq!(row.meta.width, None);
        assert_eq!(row.meta.filename.as_deref(), Some("broken.jpg"));
    }

    #[tokio::test]
    async fn test_feed_target_creates_entry() {
        let (db, _blobs, images) = service();
        seed_article(&db);

        let mut req = request(png(2, 2), "a.png");
        req.feed_target = Some("a1".into());
        req.description = Some("sunset".into());
        req.folder = Some("gallery".into());

        let out = images.upload(req).await.unwrap();
        assert!(out.key.starts_with("gallery/"));
        assert!(out.feed_entry_id.is_some());

        let entries = db.list_feed_entries(0, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].article_id.as_deref(), Some("a1"));
        assert_eq!(entries[0].description.as_deref(), Some("sunset"));
    }

    #[tokio::test]
    async fn test_unknown_feed_target_writes_nothing() {
        let (db, blobs, images) = service();

        let mut req = request(png(2, 2), "a.png");
        req.feed_target = Some("missing".into());

        assert!(matches!(images.upload(req).await, Err(ApiError::NotFound(_))));
        assert_eq!(db.count_images().unwrap(), 0);
        assert!(blobs.list("uploads/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_and_bad_folder_rejected() {
        let (_db, _blobs, images) = service();

        assert!(matches!(
            images.upload(request(Bytes::new(), "a.png")).await,
            Err(ApiError::Validation(_))
        ));

        let mut req = request(png(1, 1), "a.png");
        req.folder = Some("../etc".into());
        assert!(matches!(images.upload(req).await, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_feed_entries() {
        let (db, _blobs, images) = service();
        seed_article(&db);

        let mut req = request(png(2, 2), "a.png");
        req.feed_target = Some("a1".into());
        let out = images.upload(req).await.unwrap();
        let image_id = out.image_id.unwrap();

        assert_eq!(images.delete(&image_id).await.unwrap(), 1);
        assert_eq!(db.count_feed_entries().unwrap(), 0);
        assert!(matches!(images.delete(&image_id).await, Err(ApiError::NotFound(_))));
    }
}
