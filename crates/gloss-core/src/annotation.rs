//! Legacy records and the tagged reference that lets current and legacy
//! annotations flow through the same view/delete operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::HighlightId;

/// Name of the key-value collection holding legacy records.
pub const LEGACY_COLLECTION: &str = "flashcards";

// ─── Legacy record ───────────────────────────────────────────────────────────

/// The older flat annotation shape: no numeric id and no cascade
/// relationships. Identified only by `(highlighted_text, url)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRecord {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub highlighted_text: Option<String>,
  pub url:              String,
  pub question:         String,
  pub answer:           String,
  pub timestamp:        DateTime<Utc>,
}

impl LegacyRecord {
  /// Whether this record is the one a legacy marker with `text` on `url`
  /// refers to.
  pub fn matches(&self, text: &str, url: &str) -> bool {
    self.url == url && self.highlighted_text.as_deref() == Some(text)
  }
}

// ─── AnnotationRef ───────────────────────────────────────────────────────────

/// Which kind of record a marker points back to.
///
/// Carried explicitly through lookup, view and delete; never inferred from
/// whether some field happens to be present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnotationRef {
  /// A record in the indexed store.
  Current { id: HighlightId },
  /// A record in the legacy bag, keyed by its text on a given page.
  Legacy { text: String, url: String },
}

impl AnnotationRef {
  pub fn current(id: HighlightId) -> Self { Self::Current { id } }

  pub fn legacy(text: impl Into<String>, url: impl Into<String>) -> Self {
    Self::Legacy { text: text.into(), url: url.into() }
  }

  pub fn highlight_id(&self) -> Option<HighlightId> {
    match self {
      Self::Current { id } => Some(*id),
      Self::Legacy { .. } => None,
    }
  }

  pub fn is_legacy(&self) -> bool { matches!(self, Self::Legacy { .. }) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(text: Option<&str>, url: &str) -> LegacyRecord {
    LegacyRecord {
      highlighted_text: text.map(str::to_owned),
      url:              url.into(),
      question:         "q".into(),
      answer:           "a".into(),
      timestamp:        Utc::now(),
    }
  }

  #[test]
  fn legacy_match_requires_text_and_url() {
    let r = record(Some("cell"), "https://a.example/");
    assert!(r.matches("cell", "https://a.example/"));
    assert!(!r.matches("cell", "https://a.example"));
    assert!(!r.matches("cells", "https://a.example/"));
    assert!(!record(None, "https://a.example/").matches("", "https://a.example/"));
  }

  #[test]
  fn legacy_record_reads_original_shape() {
    let raw = r#"{
      "highlightedText": "powerhouse",
      "url": "https://bio.example/cell",
      "question": "What?",
      "answer": "Mitochondria",
      "timestamp": "2024-03-01T10:00:00Z"
    }"#;
    let r: LegacyRecord = serde_json::from_str(raw).unwrap();
    assert_eq!(r.highlighted_text.as_deref(), Some("powerhouse"));
  }

  #[test]
  fn reference_kinds() {
    assert_eq!(
      AnnotationRef::current(HighlightId(4)).highlight_id(),
      Some(HighlightId(4))
    );
    assert!(AnnotationRef::legacy("x", "u").is_legacy());
  }
}
