use std::path::PathBuf;

use anyhow::{Context, bail};

use mosaic_blob::BlobStoreConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub api_key: Option<String>,
    pub blob: BlobStoreConfig,
    pub blob_public_url: Option<String>,
    pub upload_max_bytes: usize,
    /// Zero disables the background reconciler.
    pub reconcile_interval_secs: u64,
    pub reconcile_repair: bool,
    pub reconcile_window: usize,
    /// `username:password`.
    pub bootstrap_admin: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("MOSAIC_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MOSAIC_JWT_SECRET is unset or still a placeholder");
        }

        let blob = match get("MOSAIC_BLOB_BACKEND").as_deref().unwrap_or("memory") {
            "memory" => BlobStoreConfig::Memory,
            "local" => BlobStoreConfig::Local {
                path: get("MOSAIC_BLOB_LOCAL_DIR")
                    .unwrap_or_else(|| "./blob-storage".into())
                    .into(),
            },
            "s3" => BlobStoreConfig::S3 {
                endpoint: get("MOSAIC_S3_ENDPOINT"),
                access_key: get("MOSAIC_S3_ACCESS_KEY").context("MOSAIC_S3_ACCESS_KEY is required")?,
                secret_key: get("MOSAIC_S3_SECRET_KEY").context("MOSAIC_S3_SECRET_KEY is required")?,
                bucket: get("MOSAIC_S3_BUCKET").context("MOSAIC_S3_BUCKET is required")?,
                region: get("MOSAIC_S3_REGION"),
            },
            other => bail!("unknown MOSAIC_BLOB_BACKEND '{}'", other),
        };

        Ok(Self {
            host: get("MOSAIC_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(get("MOSAIC_PORT"), "MOSAIC_PORT", 3000)?,
            db_path: get("MOSAIC_DB_PATH").unwrap_or_else(|| "mosaic.db".into()).into(),
            jwt_secret,
            api_key: get("MOSAIC_API_KEY"),
            blob,
            blob_public_url: get("MOSAIC_BLOB_PUBLIC_URL"),
            upload_max_bytes: parse_or(get("MOSAIC_UPLOAD_MAX_BYTES"), "MOSAIC_UPLOAD_MAX_BYTES", 10 * 1024 * 1024)?,
            reconcile_interval_secs: parse_or(
                get("MOSAIC_RECONCILE_INTERVAL_SECS"),
                "MOSAIC_RECONCILE_INTERVAL_SECS",
                0,
            )?,
            reconcile_repair: parse_or(get("MOSAIC_RECONCILE_REPAIR"), "MOSAIC_RECONCILE_REPAIR", false)?,
            reconcile_window: parse_or(get("MOSAIC_RECONCILE_WINDOW"), "MOSAIC_RECONCILE_WINDOW", 100)?,
            bootstrap_admin: get("MOSAIC_BOOTSTRAP_ADMIN"),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, v, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("MOSAIC_JWT_SECRET", "s3cr3t-value")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.upload_max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.reconcile_interval_secs, 0);
        assert_eq!(config.reconcile_window, 100);
        assert!(!config.reconcile_repair);
        assert!(config.api_key.is_none());
        assert!(matches!(config.blob, BlobStoreConfig::Memory));
    }

    #[test]
    fn test_placeholder_secret_rejected() {
        assert!(load(&[]).is_err());
        assert!(load(&[("MOSAIC_JWT_SECRET", "dev-secret-change-me")]).is_err());
        assert!(load(&[("MOSAIC_JWT_SECRET", "   ")]).is_err());
    }

    #[test]
    fn test_s3_backend_requires_credentials() {
        let base = [("MOSAIC_JWT_SECRET", "x1"), ("MOSAIC_BLOB_BACKEND", "s3")];
        assert!(load(&base).is_err());

        let config = load(&[
            base[0],
            base[1],
            ("MOSAIC_S3_ACCESS_KEY", "ak"),
            ("MOSAIC_S3_SECRET_KEY", "sk"),
            ("MOSAIC_S3_BUCKET", "media"),
            ("MOSAIC_S3_ENDPOINT", "http://minio:9000"),
        ])
        .unwrap();
        match config.blob {
            BlobStoreConfig::S3 { bucket, endpoint, .. } => {
                assert_eq!(bucket, "media");
                assert_eq!(endpoint.as_deref(), Some("http://minio:9000"));
            }
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn test_invalid_numbers_and_backend() {
        assert!(load(&[("MOSAIC_JWT_SECRET", "x1"), ("MOSAIC_PORT", "http")]).is_err());
        assert!(load(&[("MOSAIC_JWT_SECRET", "x1"), ("MOSAIC_BLOB_BACKEND", "ftp")]).is_err());
        let config = load(&[("MOSAIC_JWT_SECRET", "x1"), ("MOSAIC_RECONCILE_REPAIR", "true")]).unwrap();
        assert!(config.reconcile_repair);
    }
}
