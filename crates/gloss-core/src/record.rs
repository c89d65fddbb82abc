//! Record types owned by the annotation store.
//!
//! Field names serialise in camelCase so snapshots exchanged between contexts
//! keep the same shape as the persisted record layout (`pageUrl`,
//! `highlightId`, …).

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Store-assigned highlight key. Issued monotonically and never reused, so a
/// marker's `data-highlight-id` always points at one record or at nothing.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct HighlightId(pub i64);

/// Store-assigned flashcard key.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FlashcardId(pub i64);

impl fmt::Display for HighlightId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl fmt::Display for FlashcardId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl FromStr for HighlightId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.trim()
      .parse::<i64>()
      .map(HighlightId)
      .map_err(|_| Error::InvalidId(s.to_owned()))
  }
}

// ─── Page ────────────────────────────────────────────────────────────────────

/// One visited document. Upserted on every save; never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
  pub url:          String,
  /// Fingerprint of the content at save time. Stored for future change
  /// detection; nothing compares it yet.
  pub content_hash: String,
  pub last_visited: DateTime<Utc>,
}

// ─── Locators ────────────────────────────────────────────────────────────────

/// Start/end offsets of the captured range inside its boundary containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorOffset {
  pub start: usize,
  pub end:   usize,
}

/// Text immediately surrounding the captured span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorContext {
  pub before: String,
  pub after:  String,
}

/// Redundant location hints captured alongside a highlight.
///
/// Only `text_content` is relied upon when re-anchoring; the structural path,
/// offsets and context are recorded for a stronger matcher later on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locators {
  #[serde(default)]
  pub xpath:        String,
  pub text_content: String,
  #[serde(default)]
  pub offset:       LocatorOffset,
  #[serde(default)]
  pub context:      LocatorContext,
}

impl Locators {
  /// A bundle carrying nothing but the text itself.
  pub fn text_only(text: impl Into<String>) -> Self {
    Self { text_content: text.into(), ..Self::default() }
  }
}

// ─── Highlight ───────────────────────────────────────────────────────────────

/// One anchored span of text. Never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
  pub id:        HighlightId,
  /// Soft reference to [`Page::url`]; rows for unknown pages are tolerated.
  pub page_url:  String,
  pub text:      String,
  pub locators:  Locators,
  pub timestamp: DateTime<Utc>,
}

/// Input to [`crate::store::AnnotationStore::put_highlight`]. The id and
/// timestamp are always assigned by the store.
#[derive(Debug, Clone)]
pub struct NewHighlight {
  pub page_url: String,
  pub text:     String,
  pub locators: Locators,
}

impl NewHighlight {
  pub fn new(page_url: impl Into<String>, text: impl Into<String>) -> Self {
    let text = text.into();
    Self {
      page_url: page_url.into(),
      locators: Locators::text_only(text.clone()),
      text,
    }
  }
}

// ─── Flashcard ───────────────────────────────────────────────────────────────

/// One question/answer pair, optionally tied to a highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
  pub id:           FlashcardId,
  /// `None` for a card with no anchored text.
  pub highlight_id: Option<HighlightId>,
  pub page_url:     String,
  pub question:     String,
  pub answer:       String,
  pub timestamp:    DateTime<Utc>,
}

/// Input to [`crate::store::AnnotationStore::put_flashcard`].
#[derive(Debug, Clone)]
pub struct NewFlashcard {
  pub highlight_id: Option<HighlightId>,
  pub page_url:     String,
  pub question:     String,
  pub answer:       String,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The full contents of the highlight and flashcard collections at one
/// instant. Exchanged only between the document context and the detached
/// surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  pub flashcards: Vec<Flashcard>,
  pub highlights: Vec<Highlight>,
}

impl Snapshot {
  pub fn is_empty(&self) -> bool {
    self.flashcards.is_empty() && self.highlights.is_empty()
  }
}
