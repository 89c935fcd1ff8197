use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{BlobError, Result};

/// Public base used by backends that are not served by a real bucket.
const DEFAULT_LOCAL_PUBLIC_BASE: &str = "http://localhost:3000/blobs";

/// Configuration for the object storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlobStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local { path: PathBuf },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// Custom endpoint (MinIO, LocalStack); `None` means AWS.
        endpoint: Option<String>,
        access_key: String,
        secret_key: String,
        bucket: String,
        region: Option<String>,
    },
}

impl BlobStoreConfig {
    /// Where objects are publicly reachable when no explicit base is given.
    fn default_public_base(&self) -> String {
        match self {
            Self::Memory | Self::Local { .. } => DEFAULT_LOCAL_PUBLIC_BASE.to_string(),
            Self::S3 {
                endpoint: Some(endpoint),
                bucket,
                ..
            } => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
            Self::S3 {
                endpoint: None,
                bucket,
                region,
                ..
            } => format!(
                "https://{}.s3.{}.amazonaws.com",
                bucket,
                region.as_deref().unwrap_or("us-east-1")
            ),
        }
    }
}

/// One listed object.
#[derive(Debug, Clone)]
pub struct BlobMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Handle to the blob backend. Cheap to clone.
#[derive(Clone)]
pub struct BlobStore {
    inner: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    public_base: Url,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("public_base", &self.public_base.as_str())
            .field("signing", &self.signer.is_some())
            .finish()
    }
}

impl BlobStore {
    /// Build a backend from configuration. `public_base` overrides the URL
    /// prefix under which stored objects are publicly reachable.
    pub async fn new(config: BlobStoreConfig, public_base: Option<&str>) -> Result<Self> {
        let base = public_base
            .map(str::to_string)
            .unwrap_or_else(|| config.default_public_base());
        let public_base = parse_base(&base)?;

        let (inner, signer): (Arc<dyn ObjectStore>, Option<Arc<dyn Signer>>) = match &config {
            BlobStoreConfig::Memory => {
                let memory: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
                (memory, None)
            }

            BlobStoreConfig::Local { path } => {
                tokio::fs::create_dir_all(path).await?;
                let fs: Arc<dyn ObjectStore> = Arc::new(
                    LocalFileSystem::new_with_prefix(path)
                        .map_err(|e| BlobError::InvalidConfig(e.to_string()))?,
                );
                (fs, None)
            }

            BlobStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let mut builder = AmazonS3Builder::new()
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"));
                if let Some(endpoint) = endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                }

                let s3 = Arc::new(
                    builder
                        .build()
                        .map_err(|e| BlobError::InvalidConfig(e.to_string()))?,
                );
                let store: Arc<dyn ObjectStore> = s3.clone();
                let signer: Arc<dyn Signer> = s3;
                (store, Some(signer))
            }
        };

        info!(
            public_base = %public_base,
            signing = signer.is_some(),
            "Blob store initialized"
        );

        Ok(Self {
            inner,
            signer,
            public_base,
        })
    }

    /// In-memory backend with the given public base (tests, local runs).
    pub fn memory(public_base: &str) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(InMemory::new()),
            signer: None,
            public_base: parse_base(public_base)?,
        })
    }

    pub async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = object_path(key)?;
        let size = data.len();
        self.inner.put(&path, data.into()).await?;
        debug!(key, size, "Blob stored");
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = object_path(key)?;
        match self.inner.get(&path).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Existence probe. A missing object is `Ok(false)`; only transport or
    /// backend failures are errors.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = object_path(key)?;
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an object. Deleting a missing object succeeds.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = object_path(key)?;
        match self.inner.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                warn!(key, "Blob already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every object under `prefix` (a folder, with or without trailing `/`).
    pub async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>> {
        let prefix = ObjectPath::from(prefix.trim_matches('/'));
        let items: Vec<_> = self.inner.list(Some(&prefix)).try_collect().await?;

        Ok(items
            .into_iter()
            .map(|meta| BlobMeta {
                key: meta.location.to_string(),
                size: meta.size as u64,
                last_modified: meta.last_modified,
            })
            .collect())
    }

    /// Unsigned URL under the public base.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base.as_str().trim_end_matches('/'), key)
    }

    /// Time-limited GET URL. Backends without request signing hand out the
    /// public URL instead.
    pub async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        let path = object_path(key)?;
        match &self.signer {
            Some(signer) => {
                let url = signer.signed_url(http::Method::GET, &path, expires_in).await?;
                Ok(url.to_string())
            }
            None => {
                debug!(key, "Backend cannot sign; returning public URL");
                Ok(self.public_url(key))
            }
        }
    }

    /// Recover a storage key from a URL previously produced by
    /// [`public_url`](Self::public_url): the path after the host, minus the
    /// public base's own path. `None` when the URL does not parse, points at
    /// another origin, or carries no key.
    pub fn key_from_url(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        if parsed.origin() != self.public_base.origin() {
            return None;
        }

        let base_path = self.public_base.path().trim_end_matches('/');
        let rest = parsed.path().strip_prefix(base_path)?;
        if !rest.starts_with('/') {
            return None;
        }
        let key = rest.trim_start_matches('/');
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }
}

fn parse_base(base: &str) -> Result<Url> {
    Url::parse(base).map_err(|e| BlobError::InvalidConfig(format!("public base '{}': {}", base, e)))
}

fn object_path(key: &str) -> Result<ObjectPath> {
    ObjectPath::parse(key).map_err(|e| BlobError::InvalidKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://bucket.example.com";

    #[tokio::test]
    async fn test_memory_put_probe_delete() {
        let store = BlobStore::memory(BASE).unwrap();
        let data = Bytes::from("hello world");

        store.put("uploads/a.txt", data.clone()).await.unwrap();
        assert_eq!(store.get("uploads/a.txt").await.unwrap(), Some(data));
        assert!(store.exists("uploads/a.txt").await.unwrap());

        store.delete("uploads/a.txt").await.unwrap();
        assert!(!store.exists("uploads/a.txt").await.unwrap());
        // Second delete tolerates NotFound.
        store.delete("uploads/a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_scoped_to_prefix() {
        let store = BlobStore::memory(BASE).unwrap();
        store.put("uploads/a.png", Bytes::from("a")).await.unwrap();
        store.put("uploads/b.png", Bytes::from("bb")).await.unwrap();
        store.put("avatars/c.png", Bytes::from("c")).await.unwrap();

        let mut keys: Vec<String> = store
            .list("uploads/")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["uploads/a.png", "uploads/b.png"]);
    }

    #[tokio::test]
    async fn test_local_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(
            BlobStoreConfig::Local {
                path: dir.path().join("blobs"),
            },
            None,
        )
        .await
        .unwrap();

        store.put("uploads/x.bin", Bytes::from_static(b"xyz")).await.unwrap();
        assert!(store.exists("uploads/x.bin").await.unwrap());
        assert!(store.public_url("uploads/x.bin").starts_with(DEFAULT_LOCAL_PUBLIC_BASE));
    }

    #[tokio::test]
    async fn test_signed_url_falls_back_to_public() {
        let store = BlobStore::memory(BASE).unwrap();
        let url = store
            .signed_url("uploads/a.png", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(url, "https://bucket.example.com/uploads/a.png");
    }

    #[test]
    fn test_key_from_url() {
        let store = BlobStore::memory(BASE).unwrap();
        let url = store.public_url("uploads/a.png");
        assert_eq!(store.key_from_url(&url).as_deref(), Some("uploads/a.png"));

        assert_eq!(store.key_from_url("not a url"), None);
        assert_eq!(store.key_from_url("https://other.example.com/uploads/a.png"), None);
        assert_eq!(store.key_from_url("https://bucket.example.com/"), None);
    }

    #[test]
    fn test_key_from_url_with_path_style_base() {
        let store = BlobStore::memory("http://minio:9000/media/").unwrap();
        let url = store.public_url("uploads/a.png");
        assert_eq!(url, "http://minio:9000/media/uploads/a.png");
        assert_eq!(store.key_from_url(&url).as_deref(), Some("uploads/a.png"));
        assert_eq!(store.key_from_url("http://minio:9000/other/uploads/a.png"), None);
    }

    #[test]
    fn test_default_public_base_for_s3() {
        let config = BlobStoreConfig::S3 {
            endpoint: None,
            access_key: "k".into(),
            secret_key: "s".into(),
            bucket: "media".into(),
            region: Some("eu-west-1".into()),
        };
        assert_eq!(config.default_public_base(), "https://media.s3.eu-west-1.amazonaws.com");
    }
}
