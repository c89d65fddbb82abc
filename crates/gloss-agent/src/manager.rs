//! The per-document session: capture selections, save flashcards, restore
//! markers on load, and view or delete what a marker points at.
//!
//! ```text
//! Idle ──select──▶ Selecting ──save──▶ PendingSave ──▶ Idle
//! Idle ──view───▶ Viewing ──delete / close / view same marker──▶ Idle
//! ```

use std::sync::Arc;

use gloss_anchor::{
  AnchorResolver, Document, MarkerHandle, NodeId, Placement, Range, Selection,
};
use gloss_core::{
  annotation::{AnnotationRef, LegacyRecord},
  record::{Flashcard, FlashcardId, HighlightId, NewFlashcard, NewHighlight},
  store::{AnnotationStore, LegacyBag},
};
use tracing::{debug, info, warn};

use crate::{
  AgentConfig, Error, Result,
  prompt::{self, Prompt},
};

// ─── State ───────────────────────────────────────────────────────────────────

/// The question and answer shown for a marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardView {
  pub annotation: AnnotationRef,
  pub question:   String,
  pub answer:     String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
  Idle,
  /// A selection is pending and will be anchored by the next save.
  Selecting,
  /// A save is running.
  PendingSave,
  Viewing { marker: MarkerHandle, card: CardView },
}

/// What `restore_all` managed to put back on the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
  pub restored: Vec<MarkerHandle>,
  pub missed:   Vec<AnnotationRef>,
}

/// What a successful save produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCard {
  pub flashcard_id: FlashcardId,
  pub highlight_id: Option<HighlightId>,
  /// `None` when there was no selection, or when the marker could not be
  /// drawn after the highlight was stored.
  pub placement:    Option<Placement>,
}

// ─── Manager ─────────────────────────────────────────────────────────────────

pub struct AnnotationManager<S, P> {
  store:         Arc<S>,
  prompt:        P,
  resolver:      AnchorResolver,
  page_url:      String,
  document:      Document,
  context_chars: usize,
  pending:       Option<Selection>,
  state:         SessionState,
}

impl<S, P> AnnotationManager<S, P>
where
  S: AnnotationStore + LegacyBag,
  P: Prompt,
{
  pub fn new(
    store: Arc<S>,
    prompt: P,
    page_url: impl Into<String>,
    document: Document,
    config: &AgentConfig,
  ) -> Self {
    Self {
      store,
      prompt,
      resolver: AnchorResolver::new(config.marker_style()),
      page_url: page_url.into(),
      document,
      context_chars: config.context_chars,
      pending: None,
      state: SessionState::Idle,
    }
  }

  pub fn state(&self) -> &SessionState { &self.state }

  pub fn pending(&self) -> Option<&Selection> { self.pending.as_ref() }

  pub fn document(&self) -> &Document { &self.document }

  pub fn page_url(&self) -> &str { &self.page_url }

  pub fn resolver(&self) -> &AnchorResolver { &self.resolver }

  // ── Selection ─────────────────────────────────────────────────────────

  /// Record `range` as the pending selection, replacing any earlier one.
  /// Returns `false` (and changes nothing) for a whitespace-only range.
  pub fn select(&mut self, range: &Range) -> Result<bool> {
    let Some(selection) = self.resolver.selection(&self.document, range, self.context_chars)?
    else {
      return Ok(false);
    };
    debug!(text = %selection.text, "selection captured");
    self.pending = Some(selection);
    if matches!(self.state, SessionState::Idle) {
      self.state = SessionState::Selecting;
    }
    Ok(true)
  }

  // ── Save ──────────────────────────────────────────────────────────────

  /// Save a flashcard, anchored to the pending selection if there is one.
  ///
  /// The page, highlight and flashcard writes are separate awaits. A failure
  /// part-way leaves earlier writes in place; the user is told and the
  /// pending selection is discarded either way.
  pub async fn save(&mut self, question: &str, answer: &str) -> Result<SavedCard> {
    if question.trim().is_empty() || answer.trim().is_empty() {
      self.prompt.alert(prompt::MISSING_FIELDS);
      return Err(Error::MissingFields);
    }

    self.state = SessionState::PendingSave;
    let result = self.persist(question, answer).await;
    self.pending = None;
    self.state = SessionState::Idle;

    match result {
      Ok(saved) => {
        info!(
          flashcard = %saved.flashcard_id,
          highlight = ?saved.highlight_id,
          page = %self.page_url,
          "flashcard saved"
        );
        Ok(saved)
      }
      Err(e) => {
        warn!(error = %e, "saving flashcard failed");
        self.prompt.alert(prompt::SAVE_FAILED);
        Err(e)
      }
    }
  }

  async fn persist(&mut self, question: &str, answer: &str) -> Result<SavedCard> {
    let content = self.document.inner_markup(self.document.body())?;
    self
      .store
      .put_page(&self.page_url, &content)
      .await
      .map_err(Error::store)?;

    let mut highlight_id = None;
    let mut placement = None;
    if let Some(selection) = self.pending.take() {
      let id = self
        .store
        .put_highlight(NewHighlight {
          page_url: self.page_url.clone(),
          text:     selection.text.clone(),
          locators: selection.locators.clone(),
        })
        .await
        .map_err(Error::store)?;
      highlight_id = Some(id);

      match self
        .resolver
        .anchor(&mut self.document, &selection.range, AnnotationRef::current(id))
      {
        Ok(placed) => placement = Some(placed),
        Err(e) => warn!(error = %e, highlight = %id, "could not draw marker for saved highlight"),
      }
    }

    let flashcard_id = self
      .store
      .put_flashcard(NewFlashcard {
        highlight_id,
        page_url: self.page_url.clone(),
        question: question.to_owned(),
        answer: answer.to_owned(),
      })
      .await
      .map_err(Error::store)?;

    Ok(SavedCard { flashcard_id, highlight_id, placement })
  }

  // ── Restore ───────────────────────────────────────────────────────────

  /// Put markers back for every stored highlight on this page, then for
  /// legacy records that carry highlighted text. Failures are logged and
  /// skipped; nothing here is reported to the user.
  pub async fn restore_all(&mut self) -> RestoreReport {
    let mut report = RestoreReport::default();

    let highlights = self.store.highlights_for_page(&self.page_url).await;
    match highlights {
      Ok(highlights) => {
        for highlight in highlights.into_iter().filter(|h| !h.text.is_empty()) {
          self.restore_one(&highlight.text, AnnotationRef::current(highlight.id), &mut report);
        }
      }
      Err(e) => warn!(error = %e, "could not load highlights"),
    }

    let page_url = self.page_url.clone();
    let records = self.store.legacy_records().await;
    match records {
      Ok(records) => {
        for record in records.into_iter().filter(|r| r.url == page_url) {
          let Some(text) = record.highlighted_text.filter(|t| !t.is_empty()) else {
            continue;
          };
          let annotation = AnnotationRef::legacy(text.clone(), page_url.clone());
          self.restore_one(&text, annotation, &mut report);
        }
      }
      Err(e) => warn!(error = %e, "could not load legacy records"),
    }

    info!(
      restored = report.restored.len(),
      missed = report.missed.len(),
      page = %self.page_url,
      "restored highlights"
    );
    report
  }

  fn restore_one(&mut self, text: &str, annotation: AnnotationRef, report: &mut RestoreReport) {
    match self.resolver.restore(&mut self.document, text, annotation.clone()) {
      Ok(placed) => report.restored.push(placed.marker),
      Err(e) => {
        warn!(error = %e, ?annotation, "could not restore highlight");
        report.missed.push(annotation);
      }
    }
  }

  // ── View ──────────────────────────────────────────────────────────────

  /// Show the flashcard behind the marker enclosing `node`.
  ///
  /// Activating the marker that is already being viewed closes the view.
  /// Returns `None` when nothing is shown afterwards.
  pub async fn view(&mut self, node: NodeId) -> Result<Option<CardView>> {
    let Some(marker) = self.resolver.marker_at(&self.document, node, &self.page_url) else {
      return Ok(None);
    };

    let was_viewing = match &self.state {
      SessionState::Viewing { marker: open, .. } => Some(open.annotation.clone()),
      _ => None,
    };
    self.close_view();
    if was_viewing.as_ref() == Some(&marker.annotation) {
      return Ok(None);
    }

    let card = match self.lookup(&marker.annotation).await {
      Ok(card) => card,
      Err(e) => {
        warn!(error = %e, "could not load flashcard");
        return Err(e);
      }
    };
    let Some(card) = card else {
      debug!(annotation = ?marker.annotation, "marker has no flashcard");
      return Ok(None);
    };

    self.state = SessionState::Viewing { marker, card: card.clone() };
    Ok(Some(card))
  }

  async fn lookup(&self, annotation: &AnnotationRef) -> Result<Option<CardView>> {
    let found = match annotation {
      AnnotationRef::Current { id } => self
        .store
        .flashcards_for_highlight(*id)
        .await
        .map_err(Error::store)?
        .into_iter()
        .next()
        .map(|c| (c.question, c.answer)),
      AnnotationRef::Legacy { text, url } => self
        .store
        .legacy_records()
        .await
        .map_err(Error::store)?
        .into_iter()
        .find(|r| r.matches(text, url))
        .map(|r| (r.question, r.answer)),
    };
    Ok(found.map(|(question, answer)| CardView {
      annotation: annotation.clone(),
      question,
      answer,
    }))
  }

  pub fn close_view(&mut self) {
    if matches!(self.state, SessionState::Viewing { .. }) {
      self.state = if self.pending.is_some() {
        SessionState::Selecting
      } else {
        SessionState::Idle
      };
    }
  }

  // ── Delete ────────────────────────────────────────────────────────────

  /// Delete what the open view shows, after confirmation. Returns `false`
  /// when the user declines.
  pub async fn delete(&mut self) -> Result<bool> {
    let SessionState::Viewing { marker, .. } = &self.state else {
      return Err(Error::NotViewing);
    };
    let marker = marker.clone();

    if !self.prompt.confirm(prompt::CONFIRM_DELETE) {
      return Ok(false);
    }

    if let Err(e) = self.remove(&marker).await {
      warn!(error = %e, "deleting flashcard failed");
      self.prompt.alert(prompt::DELETE_FAILED);
      return Err(e);
    }

    info!(annotation = ?marker.annotation, "flashcard deleted");
    self.close_view();
    Ok(true)
  }

  /// Flashcards saved against this page without a highlight. They have no
  /// marker, so they are listed rather than viewed.
  pub async fn page_cards(&self) -> Result<Vec<Flashcard>> {
    let cards = self
      .store
      .flashcards_for_page(&self.page_url)
      .await
      .map_err(Error::store)?;
    Ok(cards.into_iter().filter(|c| c.highlight_id.is_none()).collect())
  }

  /// Delete the highlight-less flashcard `id`, after confirmation. Returns
  /// `false` when the user declines. A card tied to a highlight is refused
  /// here; it goes through [`delete`](Self::delete) so its marker goes too.
  pub async fn delete_card(&mut self, id: FlashcardId) -> Result<bool> {
    let cards = match self.page_cards().await {
      Ok(cards) => cards,
      Err(e) => {
        warn!(error = %e, "could not load flashcards");
        self.prompt.alert(prompt::DELETE_FAILED);
        return Err(e);
      }
    };
    if !cards.iter().any(|c| c.id == id) {
      return Err(Error::NoSuchCard(id));
    }

    if !self.prompt.confirm(prompt::CONFIRM_DELETE) {
      return Ok(false);
    }

    let deleted = self.store.delete_flashcard(id).await;
    if let Err(e) = deleted {
      warn!(error = %e, flashcard = %id, "deleting flashcard failed");
      self.prompt.alert(prompt::DELETE_FAILED);
      return Err(Error::store(e));
    }

    info!(flashcard = %id, page = %self.page_url, "flashcard deleted");
    Ok(true)
  }

  async fn remove(&mut self, marker: &MarkerHandle) -> Result<()> {
    match &marker.annotation {
      AnnotationRef::Current { id } => {
        let removed = self.store.delete_highlight(*id).await.map_err(Error::store)?;
        debug!(highlight = %id, flashcards = removed, "highlight removed");
      }
      AnnotationRef::Legacy { text, url } => {
        let records = self.store.legacy_records().await.map_err(Error::store)?;
        let kept: Vec<LegacyRecord> =
          records.into_iter().filter(|r| !r.matches(text, url)).collect();
        self
          .store
          .replace_legacy_records(kept)
          .await
          .map_err(Error::store)?;
      }
    }
    self.resolver.unanchor(&mut self.document, marker.node)?;
    Ok(())
  }
}
