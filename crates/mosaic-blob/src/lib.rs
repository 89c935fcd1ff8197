//! Blob Store Adapter: a thin wrapper over `object_store` exposing exactly
//! what the rest of the workspace needs (put, URLs, probe, delete, list).

mod error;
pub mod keys;
mod store;

pub use error::{BlobError, Result};
pub use store::{BlobMeta, BlobStore, BlobStoreConfig};
