pub mod admin;
pub mod articles;
pub mod auth;
pub mod error;
pub mod feed;
pub mod files;
pub mod images;
pub mod middleware;
pub mod reconciler;
pub mod router;
pub mod state;
pub mod tokens;
pub mod users;

pub use error::{ApiError, AuthError};
pub use router::router;
pub use state::{ApiSettings, AppState, AppStateInner};

use chrono::{DateTime, Utc};

/// Stored Unix milliseconds as a UTC timestamp.
pub(crate) fn to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
