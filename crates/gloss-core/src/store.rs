//! The `AnnotationStore` and `LegacyBag` traits.
//!
//! Implemented by storage backends (e.g. `gloss-store-sqlite`). The agent
//! layer depends on these abstractions, not on any concrete backend.

use std::future::Future;

use crate::{
  annotation::LegacyRecord,
  record::{
    Flashcard, FlashcardId, Highlight, HighlightId, NewFlashcard, NewHighlight,
    Page, Snapshot,
  },
};

// ─── AnnotationStore ─────────────────────────────────────────────────────────

/// Durable storage for pages, highlights and flashcards.
///
/// Operations are awaited one at a time by their callers; the store does not
/// promise anything about interleaving dependent calls.
///
/// All methods return `Send` futures so the trait can be used from tokio's
/// multi-threaded runtime.
pub trait AnnotationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Pages ─────────────────────────────────────────────────────────────

  /// Upsert the page keyed by `url`, recomputing its content hash and
  /// `last_visited` on every call.
  fn put_page<'a>(
    &'a self,
    url: &'a str,
    content: &'a str,
  ) -> impl Future<Output = Result<Page, Self::Error>> + Send + 'a;

  /// Retrieve a page by url. Returns `None` if it was never saved.
  fn get_page<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<Option<Page>, Self::Error>> + Send + 'a;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert a new highlight and return its store-assigned id.
  fn put_highlight(
    &self,
    input: NewHighlight,
  ) -> impl Future<Output = Result<HighlightId, Self::Error>> + Send + '_;

  /// Insert a new flashcard and return its store-assigned id.
  ///
  /// `input.highlight_id` is not checked against the highlight collection; a
  /// dangling reference is stored as-is.
  fn put_flashcard(
    &self,
    input: NewFlashcard,
  ) -> impl Future<Output = Result<FlashcardId, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// All highlights whose `page_url` equals `url` exactly. No ordering
  /// guarantee.
  fn highlights_for_page<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<Vec<Highlight>, Self::Error>> + Send + 'a;

  /// All flashcards referencing `id`; empty if there are none.
  fn flashcards_for_highlight(
    &self,
    id: HighlightId,
  ) -> impl Future<Output = Result<Vec<Flashcard>, Self::Error>> + Send + '_;

  /// All flashcards saved against `url`, anchored or not.
  fn flashcards_for_page<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<Vec<Flashcard>, Self::Error>> + Send + 'a;

  // ── Deletes ───────────────────────────────────────────────────────────

  /// Remove the highlight and every flashcard referencing it, atomically.
  ///
  /// Returns the number of flashcards removed alongside it.
  fn delete_highlight(
    &self,
    id: HighlightId,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Remove a single flashcard. Used for cards that carry no highlight.
  fn delete_flashcard(
    &self,
    id: FlashcardId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Snapshots ─────────────────────────────────────────────────────────

  /// The full contents of the highlight and flashcard collections.
  fn export_snapshot(
    &self,
  ) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + '_;

  /// Upsert every record in `snapshot` by id, overwriting whatever is stored
  /// under the same id. Importing the same snapshot twice is a no-op the
  /// second time.
  fn import_snapshot(
    &self,
    snapshot: Snapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── LegacyBag ───────────────────────────────────────────────────────────────

/// The flat key-value collection holding [`LegacyRecord`]s.
///
/// There is no per-record addressing: callers read the whole list, filter it,
/// and write it back.
pub trait LegacyBag: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Every legacy record, in stored order. Empty if the bag was never
  /// written.
  fn legacy_records(
    &self,
  ) -> impl Future<Output = Result<Vec<LegacyRecord>, Self::Error>> + Send + '_;

  /// Replace the whole bag with `records`.
  fn replace_legacy_records(
    &self,
    records: Vec<LegacyRecord>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
