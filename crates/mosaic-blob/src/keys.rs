//! Storage key generation and validation.

use std::path::Path;

use uuid::Uuid;

use crate::error::{BlobError, Result};

/// Lowercased extension of `filename` including the dot, or `""`.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// `[<folder>/]<uuid-v4><.ext>`. The random part keeps keys collision
/// resistant; the original filename only contributes its extension.
pub fn generate_key(folder: Option<&str>, filename: &str) -> Result<String> {
    let name = format!("{}{}", Uuid::new_v4(), extension_of(filename));
    match folder.map(|f| f.trim_matches('/')).filter(|f| !f.is_empty()) {
        Some(folder) => {
            validate_folder(folder)?;
            Ok(format!("{}/{}", folder, name))
        }
        None => Ok(name),
    }
}

/// Folders are `/`-separated segments of `[A-Za-z0-9_-]`.
pub fn validate_folder(folder: &str) -> Result<()> {
    let ok = folder.split('/').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    });
    if ok {
        Ok(())
    } else {
        Err(BlobError::InvalidKey(format!("folder '{}' is not allowed", folder)))
    }
}
