//! Runtime configuration shared by the agents and the `gloss` binary.

use std::{path::PathBuf, time::Duration};

use gloss_anchor::MarkerStyle;
use serde::Deserialize;

/// Deserialised from `gloss.toml` and `GLOSS_*` environment variables.
/// Every field has a default, so an empty source is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
  /// The authoritative store owned by the document context.
  pub document_store:    PathBuf,
  /// The detached surface's read replica.
  pub surface_store:     PathBuf,
  pub sync_timeout_secs: u64,
  /// How many characters of surrounding text to capture with a selection.
  pub context_chars:     usize,
  pub export_dir:        PathBuf,
  pub marker_class:      String,
  pub marker_color:      String,
}

impl Default for AgentConfig {
  fn default() -> Self {
    let style = MarkerStyle::default();
    Self {
      document_store:    PathBuf::from("~/.local/share/gloss/document.db"),
      surface_store:     PathBuf::from("~/.local/share/gloss/surface.db"),
      sync_timeout_secs: 5,
      context_chars:     50,
      export_dir:        PathBuf::from("."),
      marker_class:      style.class,
      marker_color:      style.color,
    }
  }
}

impl AgentConfig {
  pub fn sync_timeout(&self) -> Duration { Duration::from_secs(self.sync_timeout_secs) }

  pub fn marker_style(&self) -> MarkerStyle {
    MarkerStyle {
      class: self.marker_class.clone(),
      color: self.marker_color.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_fields_take_defaults() {
    let cfg: AgentConfig =
      serde_json::from_str(r#"{ "sync_timeout_secs": 2, "marker_color": "pink" }"#).unwrap();
    assert_eq!(cfg.sync_timeout(), Duration::from_secs(2));
    assert_eq!(cfg.context_chars, 50);
    assert_eq!(cfg.marker_style().class, "gloss-highlight");
    assert_eq!(cfg.marker_style().color, "pink");
  }
}
