//! Error type for the session layer.

use std::time::Duration;

use gloss_core::record::FlashcardId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("anchor error: {0}")]
  Anchor(#[from] gloss_anchor::Error),

  /// The document context did not answer within the sync window.
  #[error("sync timed out after {0:?}")]
  SyncTimeout(Duration),

  /// No document context answered, or it answered with an error.
  #[error("sync unavailable: {0}")]
  SyncUnavailable(String),

  #[error("question and answer are both required")]
  MissingFields,

  #[error("no flashcard is being viewed")]
  NotViewing,

  /// The id names no highlight-less flashcard on the session's page.
  #[error("no unanchored flashcard {0} on this page")]
  NoSuchCard(FlashcardId),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
