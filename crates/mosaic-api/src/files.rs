use std::time::Duration;

use axum::{
    Extension, Json,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    extract::rejection::{PathRejection, QueryRejection},
    http::header,
};
use base64::Engine;
use bytes::Bytes;
use tracing::{error, info};

use mosaic_blob::BlobError;
use mosaic_types::api::{
    Claims, DownloadQuery, DownloadResponse, Envelope, UploadJsonRequest, UploadResponse,
};

use crate::error::ApiError;
use crate::images::UploadRequest;
use crate::state::AppState;

/// Default lifetime of a download URL, in seconds.
pub const DEFAULT_URL_EXPIRY_SECS: u64 = 3600;
/// Longest lifetime S3 accepts for a presigned URL.
pub const MAX_URL_EXPIRY_SECS: u64 = 7 * 24 * 3600;

/// POST /oss/upload
///
/// Accepts either `multipart/form-data` (a `file` part plus optional
/// `folder`, `articleId` and `description` text parts) or a JSON body with
/// the file as base64.
pub async fn upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    req: Request,
) -> Result<Json<Envelope<UploadResponse>>, ApiError> {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let upload = if is_multipart {
        let multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        read_multipart(multipart).await?
    } else {
        let Json(body) = Json::<UploadJsonRequest>::from_request(req, &state).await?;
        read_json(body)?
    };

    if upload.bytes.len() > state.upload_max_bytes {
        return Err(ApiError::Validation(format!(
            "file exceeds the {} byte limit",
            state.upload_max_bytes
        )));
    }

    let file_name = upload.filename.clone();
    let size = upload.bytes.len();
    let outcome = state.images.upload(upload).await?;
    info!(user_id = %claims.user_id, file = %file_name, size, "Upload accepted");

    Ok(Json(Envelope::ok(UploadResponse {
        url: outcome.url,
        image_id: outcome.image_id.unwrap_or_default(),
        file_name,
        feed_entry_id: outcome.feed_entry_id,
    })))
}

async fn read_multipart(mut multipart: Multipart) -> Result<UploadRequest, ApiError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut folder = None;
    let mut article_id = None;
    let mut description = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("file").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(e.body_text()))?;
                file = Some((filename, data));
            }
            "folder" | "articleId" | "description" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(e.body_text()))?;
                match name.as_str() {
                    "folder" => folder = Some(text),
                    "articleId" => article_id = Some(text),
                    _ => description = Some(text),
                }
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::Validation("no file uploaded".into()))?;

    Ok(UploadRequest {
        bytes,
        filename,
        folder,
        feed_target: article_id,
        description,
    })
}

fn read_json(body: UploadJsonRequest) -> Result<UploadRequest, ApiError> {
    let (Some(file), Some(filename)) = (body.file, body.file_name) else {
        return Err(ApiError::Validation("file and fileName are required".into()));
    };

    // Tolerate `data:<mime>;base64,` prefixes.
    let encoded = file
        .split_once("base64,")
        .map(|(_, rest)| rest)
        .unwrap_or(&file)
        .trim();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| ApiError::Validation("file is not valid base64".into()))?;

    Ok(UploadRequest {
        bytes: Bytes::from(bytes),
        filename,
        folder: body.folder,
        feed_target: body.article_id,
        description: body.description,
    })
}

/// GET /oss/download/{*file_key}?expires=
pub async fn download_url(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Json<Envelope<DownloadResponse>>, ApiError> {
    let Path(file_key) = path?;
    let Query(query) = query?;

    let file_key = file_key.trim_start_matches('/').to_string();
    if file_key.is_empty() {
        return Err(ApiError::Validation("file key is required".into()));
    }

    let expires = query.expires.unwrap_or(DEFAULT_URL_EXPIRY_SECS);
    if expires == 0 || expires > MAX_URL_EXPIRY_SECS {
        return Err(ApiError::Validation(format!(
            "expires must be between 1 and {} seconds",
            MAX_URL_EXPIRY_SECS
        )));
    }

    let url = state
        .blobs
        .signed_url(&file_key, Duration::from_secs(expires))
        .await
        .map_err(|e| match e {
            BlobError::InvalidKey(reason) => ApiError::Validation(reason),
            other => {
                error!("Failed to sign download URL for {}: {}", file_key, other);
                ApiError::Internal(other.into())
            }
        })?;

    info!(key = %file_key, expires, "Download URL issued");
    Ok(Json(Envelope::ok(DownloadResponse { url, expires })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_body(file: &str) -> UploadJsonRequest {
        UploadJsonRequest {
            file: Some(file.into()),
            file_name: Some("a.txt".into()),
            folder: None,
            article_id: Some("a1".into()),
            description: None,
        }
    }

    #[test]
    fn test_json_upload_decodes_base64() {
        let req = read_json(json_body("aGVsbG8=")).unwrap();
        assert_eq!(&req.bytes[..], b"hello");
        assert_eq!(req.feed_target.as_deref(), Some("a1"));

        let req = read_json(json_body("data:text/plain;base64,aGVsbG8=")).unwrap();
        assert_eq!(&req.bytes[..], b"hello");
    }

    #[test]
    fn test_json_upload_rejects_bad_input() {
        assert!(matches!(
            read_json(json_body("!!not base64!!")),
            Err(ApiError::Validation(_))
        ));

        let mut missing = json_body("aGVsbG8=");
        missing.file_name = None;
        assert!(matches!(read_json(missing), Err(ApiError::Validation(_))));
    }
}
