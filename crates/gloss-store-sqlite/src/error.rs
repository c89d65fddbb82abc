//! Error type for `gloss-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// An operation ran before [`crate::SqliteStore::init`] resolved. Retrying
  /// after initialisation succeeds.
  #[error("storage unavailable: store is not initialised")]
  StorageUnavailable,

  #[error("core error: {0}")]
  Core(#[from] gloss_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl Error {
  /// Whether the caller may retry the same operation later.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::StorageUnavailable) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
