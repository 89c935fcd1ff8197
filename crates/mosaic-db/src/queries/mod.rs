//! Query layer. Each submodule adds methods to [`crate::Database`]; the free
//! functions taking `&Connection` compose inside a caller's transaction.

pub mod articles;
pub mod feed;
pub mod images;
pub mod tokens;
pub mod users;
