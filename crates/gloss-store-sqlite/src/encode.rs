//! Encoding and decoding helpers between domain records and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, locator bundles and legacy bags
//! as compact JSON, content hashes as lowercase hex SHA-256.

use chrono::{DateTime, Utc};
use gloss_core::{
  annotation::LegacyRecord,
  record::{
    Flashcard, FlashcardId, Highlight, HighlightId, Locators, Page,
  },
};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Content hash ────────────────────────────────────────────────────────────

pub fn content_hash(content: &str) -> String {
  hex::encode(Sha256::digest(content.as_bytes()))
}

// ─── Locators ────────────────────────────────────────────────────────────────

pub fn encode_locators(l: &Locators) -> Result<String> {
  Ok(serde_json::to_string(l)?)
}

pub fn decode_locators(s: &str) -> Result<Locators> {
  Ok(serde_json::from_str(s)?)
}

// ─── Legacy bag ──────────────────────────────────────────────────────────────

pub fn encode_bag(records: &[LegacyRecord]) -> Result<String> {
  Ok(serde_json::to_string(records)?)
}

pub fn decode_bag(s: &str) -> Result<Vec<LegacyRecord>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `pages` row.
pub struct RawPage {
  pub url:          String,
  pub content_hash: String,
  pub last_visited: String,
}

impl RawPage {
  pub fn into_page(self) -> Result<Page> {
    Ok(Page {
      url:          self.url,
      content_hash: self.content_hash,
      last_visited: decode_dt(&self.last_visited)?,
    })
  }
}

/// Raw values read directly from a `highlights` row.
pub struct RawHighlight {
  pub id:        i64,
  pub page_url:  String,
  pub text:      String,
  pub locators:  String,
  pub timestamp: String,
}

impl RawHighlight {
  pub const COLUMNS: &'static str = "id, page_url, text, locators, timestamp";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:        row.get(0)?,
      page_url:  row.get(1)?,
      text:      row.get(2)?,
      locators:  row.get(3)?,
      timestamp: row.get(4)?,
    })
  }

  pub fn into_highlight(self) -> Result<Highlight> {
    Ok(Highlight {
      id:        HighlightId(self.id),
      page_url:  self.page_url,
      text:      self.text,
      locators:  decode_locators(&self.locators)?,
      timestamp: decode_dt(&self.timestamp)?,
    })
  }
}

/// Raw values read directly from a `flashcards` row.
pub struct RawFlashcard {
  pub id:           i64,
  pub highlight_id: Option<i64>,
  pub page_url:     String,
  pub question:     String,
  pub answer:       String,
  pub timestamp:    String,
}

impl RawFlashcard {
  pub const COLUMNS: &'static str =
    "id, highlight_id, page_url, question, answer, timestamp";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      highlight_id: row.get(1)?,
      page_url:     row.get(2)?,
      question:     row.get(3)?,
      answer:       row.get(4)?,
      timestamp:    row.get(5)?,
    })
  }

  pub fn into_flashcard(self) -> Result<Flashcard> {
    Ok(Flashcard {
      id:           FlashcardId(self.id),
      highlight_id: self.highlight_id.map(HighlightId),
      page_url:     self.page_url,
      question:     self.question,
      answer:       self.answer,
      timestamp:    decode_dt(&self.timestamp)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn content_hash_is_stable_hex() {
    let a = content_hash("<p>hello</p>");
    assert_eq!(a.len(), 64);
    assert_eq!(a, content_hash("<p>hello</p>"));
    assert_ne!(a, content_hash("<p>hello!</p>"));
  }

  #[test]
  fn bad_timestamp_is_a_parse_error() {
    assert!(matches!(decode_dt("yesterday"), Err(Error::DateParse(_))));
  }
}
