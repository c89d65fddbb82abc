//! [`SqliteStore`] is the SQLite implementation of [`AnnotationStore`] and
//! [`LegacyBag`].

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::Utc;
use gloss_core::{
  annotation::{LEGACY_COLLECTION, LegacyRecord},
  record::{
    Flashcard, FlashcardId, Highlight, HighlightId, NewFlashcard, NewHighlight,
    Page, Snapshot,
  },
  store::{AnnotationStore, LegacyBag},
};
use rusqlite::OptionalExtension as _;
use tokio::sync::OnceCell;

use crate::{
  Error, Result,
  encode::{
    RawFlashcard, RawHighlight, RawPage, content_hash, decode_bag, encode_bag,
    encode_dt, encode_locators,
  },
  schema::SCHEMA,
};

// ─── Location ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Location {
  File(PathBuf),
  Memory,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An annotation store backed by a single SQLite file.
///
/// A freshly constructed store is *uninitialised*: every operation fails with
/// [`Error::StorageUnavailable`] until [`SqliteStore::init`] resolves.
/// Cloning is cheap; clones share the same (lazily opened) connection.
#[derive(Clone)]
pub struct SqliteStore {
  location: Location,
  conn:     Arc<OnceCell<tokio_rusqlite::Connection>>,
}

impl SqliteStore {
  /// Create an uninitialised handle for the database at `path`.
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      location: Location::File(path.as_ref().to_path_buf()),
      conn:     Arc::new(OnceCell::new()),
    }
  }

  /// Create an uninitialised handle for a private in-memory database.
  pub fn new_in_memory() -> Self {
    Self { location: Location::Memory, conn: Arc::new(OnceCell::new()) }
  }

  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let store = Self::new(path);
    store.init().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let store = Self::new_in_memory();
    store.init().await?;
    Ok(store)
  }

  /// Open the connection and apply the schema. Calling it again after success
  /// is a no-op.
  pub async fn init(&self) -> Result<()> {
    let location = self.location.clone();
    self
      .conn
      .get_or_try_init(|| async move {
        let conn = match &location {
          Location::File(path) => tokio_rusqlite::Connection::open(path).await?,
          Location::Memory => tokio_rusqlite::Connection::open_in_memory().await?,
        };
        conn
          .call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
          })
          .await?;
        tracing::debug!(?location, "annotation store initialised");
        Ok::<_, Error>(conn)
      })
      .await?;
    Ok(())
  }

  pub fn is_initialized(&self) -> bool { self.conn.initialized() }

  fn conn(&self) -> Result<&tokio_rusqlite::Connection> {
    self.conn.get().ok_or(Error::StorageUnavailable)
  }

  async fn query_highlights(
    &self,
    filter: &'static str,
    param: rusqlite::types::Value,
  ) -> Result<Vec<Highlight>> {
    let raws: Vec<RawHighlight> = self
      .conn()?
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM highlights {filter} ORDER BY id",
          RawHighlight::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = if filter.is_empty() {
          stmt.query_map([], RawHighlight::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          stmt.query_map([param], RawHighlight::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHighlight::into_highlight).collect()
  }

  async fn query_flashcards(
    &self,
    filter: &'static str,
    param: rusqlite::types::Value,
  ) -> Result<Vec<Flashcard>> {
    let raws: Vec<RawFlashcard> = self
      .conn()?
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM flashcards {filter} ORDER BY id",
          RawFlashcard::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = if filter.is_empty() {
          stmt.query_map([], RawFlashcard::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          stmt.query_map([param], RawFlashcard::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFlashcard::into_flashcard).collect()
  }
}

// ─── AnnotationStore impl ────────────────────────────────────────────────────

impl AnnotationStore for SqliteStore {
  type Error = Error;

  // ── Pages ─────────────────────────────────────────────────────────────────

  async fn put_page(&self, url: &str, content: &str) -> Result<Page> {
    let page = Page {
      url:          url.to_owned(),
      content_hash: content_hash(content),
      last_visited: Utc::now(),
    };

    let url_str  = page.url.clone();
    let hash_str = page.content_hash.clone();
    let at_str   = encode_dt(page.last_visited);

    self
      .conn()?
      .call(move |conn| {
        conn.execute(
          "INSERT INTO pages (url, content_hash, last_visited)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(url) DO UPDATE SET
             content_hash = excluded.content_hash,
             last_visited = excluded.last_visited",
          rusqlite::params![url_str, hash_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(url = %page.url, "page saved");
    Ok(page)
  }

  async fn get_page(&self, url: &str) -> Result<Option<Page>> {
    let url_str = url.to_owned();

    let raw: Option<RawPage> = self
      .conn()?
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT url, content_hash, last_visited FROM pages WHERE url = ?1",
              rusqlite::params![url_str],
              |row| {
                Ok(RawPage {
                  url:          row.get(0)?,
                  content_hash: row.get(1)?,
                  last_visited: row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPage::into_page).transpose()
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn put_highlight(&self, input: NewHighlight) -> Result<HighlightId> {
    let locators_str = encode_locators(&input.locators)?;
    let at_str       = encode_dt(Utc::now());
    let page_url     = input.page_url;
    let text         = input.text;

    let id = self
      .conn()?
      .call(move |conn| {
        conn.execute(
          "INSERT INTO highlights (page_url, text, locators, timestamp)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![page_url, text, locators_str, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    tracing::debug!(id, "highlight stored");
    Ok(HighlightId(id))
  }

  async fn put_flashcard(&self, input: NewFlashcard) -> Result<FlashcardId> {
    let at_str       = encode_dt(Utc::now());
    let highlight_id = input.highlight_id.map(|h| h.0);
    let NewFlashcard { page_url, question, answer, .. } = input;

    let id = self
      .conn()?
      .call(move |conn| {
        conn.execute(
          "INSERT INTO flashcards (highlight_id, page_url, question, answer, timestamp)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![highlight_id, page_url, question, answer, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    tracing::debug!(id, ?highlight_id, "flashcard stored");
    Ok(FlashcardId(id))
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn highlights_for_page(&self, url: &str) -> Result<Vec<Highlight>> {
    self
      .query_highlights("WHERE page_url = ?1", url.to_owned().into())
      .await
  }

  async fn flashcards_for_highlight(&self, id: HighlightId) -> Result<Vec<Flashcard>> {
    self
      .query_flashcards("WHERE highlight_id = ?1", id.0.into())
      .await
  }

  async fn flashcards_for_page(&self, url: &str) -> Result<Vec<Flashcard>> {
    self
      .query_flashcards("WHERE page_url = ?1", url.to_owned().into())
      .await
  }

  // ── Deletes ───────────────────────────────────────────────────────────────

  async fn delete_highlight(&self, id: HighlightId) -> Result<usize> {
    let raw_id = id.0;

    // Both removals share one transaction; a reader never sees the highlight
    // gone with its flashcards still present, or the reverse.
    let removed = self
      .conn()?
      .call(move |conn| {
        let tx = conn.transaction()?;
        let cards = tx.execute(
          "DELETE FROM flashcards WHERE highlight_id = ?1",
          rusqlite::params![raw_id],
        )?;
        tx.execute(
          "DELETE FROM highlights WHERE id = ?1",
          rusqlite::params![raw_id],
        )?;
        tx.commit()?;
        Ok(cards)
      })
      .await?;

    tracing::info!(%id, flashcards = removed, "highlight deleted");
    Ok(removed)
  }

  async fn delete_flashcard(&self, id: FlashcardId) -> Result<()> {
    let raw_id = id.0;
    self
      .conn()?
      .call(move |conn| {
        conn.execute(
          "DELETE FROM flashcards WHERE id = ?1",
          rusqlite::params![raw_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Snapshots ─────────────────────────────────────────────────────────────

  async fn export_snapshot(&self) -> Result<Snapshot> {
    let flashcards = self
      .query_flashcards("", rusqlite::types::Value::Null)
      .await?;
    let highlights = self
      .query_highlights("", rusqlite::types::Value::Null)
      .await?;
    Ok(Snapshot { flashcards, highlights })
  }

  async fn import_snapshot(&self, snapshot: Snapshot) -> Result<()> {
    let highlights = snapshot
      .highlights
      .into_iter()
      .map(|h| {
        Ok((
          h.id.0,
          h.page_url,
          h.text,
          encode_locators(&h.locators)?,
          encode_dt(h.timestamp),
        ))
      })
      .collect::<Result<Vec<_>>>()?;

    let flashcards: Vec<_> = snapshot
      .flashcards
      .into_iter()
      .map(|f| {
        (
          f.id.0,
          f.highlight_id.map(|h| h.0),
          f.page_url,
          f.question,
          f.answer,
          encode_dt(f.timestamp),
        )
      })
      .collect();

    let (n_highlights, n_flashcards) = (highlights.len(), flashcards.len());

    self
      .conn()?
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut put = tx.prepare(
            "INSERT INTO highlights (id, page_url, text, locators, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               page_url  = excluded.page_url,
               text      = excluded.text,
               locators  = excluded.locators,
               timestamp = excluded.timestamp",
          )?;
          for (id, page_url, text, locators, at) in &highlights {
            put.execute(rusqlite::params![id, page_url, text, locators, at])?;
          }

          let mut put = tx.prepare(
            "INSERT INTO flashcards (id, highlight_id, page_url, question, answer, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
               highlight_id = excluded.highlight_id,
               page_url     = excluded.page_url,
               question     = excluded.question,
               answer       = excluded.answer,
               timestamp    = excluded.timestamp",
          )?;
          for (id, highlight_id, page_url, question, answer, at) in &flashcards {
            put.execute(rusqlite::params![
              id,
              highlight_id,
              page_url,
              question,
              answer,
              at
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::info!(
      highlights = n_highlights,
      flashcards = n_flashcards,
      "snapshot imported"
    );
    Ok(())
  }
}

// ─── LegacyBag impl ──────────────────────────────────────────────────────────

impl LegacyBag for SqliteStore {
  type Error = Error;

  async fn legacy_records(&self) -> Result<Vec<LegacyRecord>> {
    let raw: Option<String> = self
      .conn()?
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT value_json FROM bags WHERE name = ?1",
              rusqlite::params![LEGACY_COLLECTION],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    match raw {
      Some(json) => decode_bag(&json),
      None => Ok(Vec::new()),
    }
  }

  async fn replace_legacy_records(&self, records: Vec<LegacyRecord>) -> Result<()> {
    let json  = encode_bag(&records)?;
    let count = records.len();

    self
      .conn()?
      .call(move |conn| {
        conn.execute(
          "INSERT INTO bags (name, value_json) VALUES (?1, ?2)
           ON CONFLICT(name) DO UPDATE SET value_json = excluded.value_json",
          rusqlite::params![LEGACY_COLLECTION, json],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(count, "legacy bag rewritten");
    Ok(())
  }
}
