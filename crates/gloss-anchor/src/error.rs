//! Error types for the gloss-anchor document layer.

use thiserror::Error;

use crate::document::NodeId;

#[derive(Debug, Error)]
pub enum Error {
  #[error("markup parse error at byte {position}: {message}")]
  Parse { position: u64, message: String },

  #[error("markup serialization error: {0}")]
  Serialize(String),

  /// No text node in the document contains the searched text.
  #[error("text not found in document: {0:?}")]
  AnchorNotFound(String),

  /// Candidates existed but no strategy could place a marker.
  #[error("could not place marker: {0}")]
  AnchorWriteFailed(String),

  #[error("invalid range: {0}")]
  InvalidRange(String),

  #[error("node {0:?} is not attached to the document")]
  Detached(NodeId),

  #[error("node {0:?} is not a highlight marker")]
  NotAMarker(NodeId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
