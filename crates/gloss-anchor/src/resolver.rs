//! Finding previously highlighted text in a freshly parsed document and
//! placing markers around it.
//!
//! The resolver is stateless: every call takes the document it works on.
//! Matching is a first-substring-occurrence scan over text nodes in document
//! order; the structural locators captured at save time are recorded but not
//! consulted.

use gloss_core::{
  annotation::AnnotationRef,
  record::{HighlightId, LocatorContext, LocatorOffset, Locators},
};
use tracing::{debug, info};

use crate::{
  Error, Result,
  document::{Document, NodeId},
  range::{Boundary, Range},
};

pub const CURRENT_ATTR: &str = "data-highlight-id";
pub const LEGACY_ATTR: &str = "data-legacy-highlight";
pub const OVERLAY_ATTR: &str = "data-overlay";

// ─── Types ───────────────────────────────────────────────────────────────────

/// How markers look. Only the class and background colour are configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerStyle {
  pub class: String,
  pub color: String,
}

impl Default for MarkerStyle {
  fn default() -> Self {
    Self { class: "gloss-highlight".into(), color: "yellow".into() }
  }
}

/// Which placement strategy produced a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapStrategy {
  /// The range's nodes were moved inside the marker unchanged.
  Surround,
  /// The range was cut out and its flattened text reinserted inside the
  /// marker. Formatting inside the range is lost.
  Extract,
  /// The document was left alone and a marker holding the text was appended
  /// to the body.
  Overlay,
}

/// A marker element in the document and the record it points back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerHandle {
  pub node:       NodeId,
  pub annotation: AnnotationRef,
}

/// The outcome of placing a marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
  pub marker:   MarkerHandle,
  pub strategy: WrapStrategy,
}

/// A captured user selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
  /// The selected text, trimmed.
  pub text:     String,
  pub range:    Range,
  pub locators: Locators,
}

// ─── Resolver ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct AnchorResolver {
  style: MarkerStyle,
}

impl AnchorResolver {
  pub fn new(style: MarkerStyle) -> Self { Self { style } }

  pub fn style(&self) -> &MarkerStyle { &self.style }

  /// Text nodes under the body whose content contains `text`, in document
  /// order.
  pub fn locate(&self, doc: &Document, text: &str) -> Vec<NodeId> {
    if text.is_empty() {
      return Vec::new();
    }
    let found: Vec<NodeId> = doc
      .text_nodes(doc.body())
      .filter(|&n| doc.text(n).is_some_and(|t| t.contains(text)))
      .collect();
    debug!(candidates = found.len(), "located text");
    found
  }

  /// The first occurrence of `text` as a live range, skipping occurrences a
  /// marker could not be placed on.
  pub fn find(&self, doc: &Document, text: &str) -> Option<Range> {
    self.locate(doc, text).into_iter().find_map(|node| {
      let start = doc.text(node)?.find(text)?;
      let range = Range::in_text(node, start, start + text.len());
      (!self.blocked(doc, &range)).then_some(range)
    })
  }

  /// Re-apply a marker for `text` after a reload. Tries each candidate in
  /// document order and stops after the first one that takes a marker.
  pub fn restore(
    &self,
    doc: &mut Document,
    text: &str,
    annotation: AnnotationRef,
  ) -> Result<Placement> {
    let candidates = self.locate(doc, text);
    if candidates.is_empty() {
      return Err(Error::AnchorNotFound(text.to_owned()));
    }

    for node in candidates {
      let Some(start) = doc.text(node).and_then(|t| t.find(text)) else {
        continue;
      };
      let range = Range::in_text(node, start, start + text.len());
      match self.wrap(doc, &range, &annotation) {
        Ok(Some(placement)) => {
          info!(?annotation, strategy = ?placement.strategy, "restored marker");
          return Ok(placement);
        }
        Ok(None) => debug!(?node, "candidate cannot hold a marker"),
        Err(e) => debug!(?node, error = %e, "candidate rejected"),
      }
    }

    Err(Error::AnchorWriteFailed(format!(
      "no occurrence of {text:?} could be wrapped"
    )))
  }

  /// Mark a live range. Falls back to an overlay marker when the range
  /// cannot be wrapped in place.
  pub fn anchor(
    &self,
    doc: &mut Document,
    range: &Range,
    annotation: AnnotationRef,
  ) -> Result<Placement> {
    doc.validate_range(range)?;
    if let Some(placement) = self.wrap(doc, range, &annotation)? {
      return Ok(placement);
    }

    let text = doc.range_text(range);
    let marker = self.marker_element(doc, &annotation);
    doc.set_attr(marker, OVERLAY_ATTR, "true");
    doc.set_attr(
      marker,
      "style",
      format!("background-color: {}; position: absolute", self.style.color),
    );
    let body = doc.create_text(text);
    doc.append_child(marker, body);
    let parent = doc.body();
    doc.append_child(parent, marker);
    debug!(?annotation, "placed overlay marker");

    Ok(Placement {
      marker:   MarkerHandle { node: marker, annotation },
      strategy: WrapStrategy::Overlay,
    })
  }

  /// Remove a marker. Inline markers give their contents back to the parent
  /// and adjacent text is merged; overlays are simply detached.
  pub fn unanchor(&self, doc: &mut Document, marker: NodeId) -> Result<()> {
    if !self.is_marker(doc, marker) {
      return Err(Error::NotAMarker(marker));
    }
    if doc.attr(marker, OVERLAY_ATTR) == Some("true") {
      doc.detach(marker);
      return Ok(());
    }
    let parent = doc.parent(marker).ok_or(Error::Detached(marker))?;
    doc.unwrap_node(marker)?;
    doc.normalize(parent);
    Ok(())
  }

  pub fn is_marker(&self, doc: &Document, node: NodeId) -> bool {
    doc.attr(node, CURRENT_ATTR).is_some() || doc.attr(node, LEGACY_ATTR) == Some("true")
  }

  /// The marker enclosing `node`, if any. Legacy markers are keyed by their
  /// text on `page_url`.
  pub fn marker_at(
    &self,
    doc: &Document,
    node: NodeId,
    page_url: &str,
  ) -> Option<MarkerHandle> {
    let marker = doc.closest(node, |n| self.is_marker(doc, n))?;
    let annotation = self.annotation_of(doc, marker, page_url)?;
    Some(MarkerHandle { node: marker, annotation })
  }

  /// Every marker in the document, in document order.
  pub fn markers(&self, doc: &Document, page_url: &str) -> Vec<MarkerHandle> {
    doc
      .descendants(doc.root())
      .filter(|&n| self.is_marker(doc, n))
      .filter_map(|n| {
        let annotation = self.annotation_of(doc, n, page_url)?;
        Some(MarkerHandle { node: n, annotation })
      })
      .collect()
  }

  /// Capture a selection: its trimmed text plus the locator bundle. Returns
  /// `None` for a selection that is empty or only whitespace.
  pub fn selection(
    &self,
    doc: &Document,
    range: &Range,
    context_chars: usize,
  ) -> Result<Option<Selection>> {
    doc.validate_range(range)?;
    let text = doc.range_text(range).trim().to_owned();
    if text.is_empty() {
      return Ok(None);
    }

    let root = doc.root();
    let before = doc.range_text(&Range::new(
      Boundary { node: root, offset: 0 },
      range.start,
    ));
    let after = doc.range_text(&Range::new(
      range.end,
      Boundary { node: root, offset: doc.node_len(root) },
    ));

    let locators = Locators {
      xpath:        xpath(doc, range.start.node),
      text_content: text.clone(),
      offset:       LocatorOffset { start: range.start.offset, end: range.end.offset },
      context:      LocatorContext {
        before: last_chars(&before, context_chars),
        after:  after.chars().take(context_chars).collect(),
      },
    };
    Ok(Some(Selection { text, range: *range, locators }))
  }

  // ── Internals ─────────────────────────────────────────────────────────

  /// Surround, then extract. `None` when the range may not hold a marker at
  /// all.
  fn wrap(
    &self,
    doc: &mut Document,
    range: &Range,
    annotation: &AnnotationRef,
  ) -> Result<Option<Placement>> {
    if self.blocked(doc, range) {
      return Ok(None);
    }

    let marker = self.marker_element(doc, annotation);
    let strategy = match doc.surround(range, marker)? {
      Ok(()) => WrapStrategy::Surround,
      Err(rejection) => {
        debug!(?rejection, "surround refused, extracting");
        doc.replace_with_flattened(range, marker)?;
        WrapStrategy::Extract
      }
    };
    Ok(Some(Placement {
      marker: MarkerHandle { node: marker, annotation: annotation.clone() },
      strategy,
    }))
  }

  /// Ranges inside raw-text elements, or touching an existing marker, never
  /// take a marker.
  fn blocked(&self, doc: &Document, range: &Range) -> bool {
    if doc.in_raw_text(range.start.node) || doc.in_raw_text(range.end.node) {
      return true;
    }
    let markers = doc.descendants(doc.root()).filter(|&n| self.is_marker(doc, n));
    doc.range_touches(range, markers)
  }

  fn marker_element(&self, doc: &mut Document, annotation: &AnnotationRef) -> NodeId {
    let marker = doc.create_element("span");
    doc.set_attr(marker, "class", self.style.class.as_str());
    doc.set_attr(marker, "style", format!("background-color: {}", self.style.color));
    match annotation {
      AnnotationRef::Current { id } => doc.set_attr(marker, CURRENT_ATTR, id.to_string()),
      AnnotationRef::Legacy { .. } => doc.set_attr(marker, LEGACY_ATTR, "true"),
    }
    marker
  }

  fn annotation_of(&self, doc: &Document, marker: NodeId, page_url: &str) -> Option<AnnotationRef> {
    if let Some(raw) = doc.attr(marker, CURRENT_ATTR) {
      return match raw.parse::<HighlightId>() {
        Ok(id) => Some(AnnotationRef::current(id)),
        Err(e) => {
          debug!(error = %e, "marker carries an unreadable id");
          None
        }
      };
    }
    Some(AnnotationRef::legacy(doc.text_content(marker), page_url))
  }
}

/// An XPath-style structural path to `node`, e.g.
/// `/html[1]/body[1]/p[2]/text()[1]`.
fn xpath(doc: &Document, node: NodeId) -> String {
  let mut steps = Vec::new();
  for n in doc.ancestors(node) {
    let Some(parent) = doc.parent(n) else { break };
    let same_kind = |s: &NodeId| match (doc.tag_name(*s), doc.tag_name(n)) {
      (Some(a), Some(b)) => a == b,
      (None, None) => doc.is_text(*s) && doc.is_text(n),
      _ => false,
    };
    let position = doc
      .children(parent)
      .iter()
      .take_while(|&&s| s != n)
      .filter(|&&s| same_kind(&s))
      .count()
      + 1;
    let name = doc.tag_name(n).unwrap_or("text()");
    steps.push(format!("{name}[{position}]"));
  }
  steps.reverse();
  format!("/{}", steps.join("/"))
}

fn last_chars(s: &str, n: usize) -> String {
  let skip = s.chars().count().saturating_sub(n);
  s.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  const URL: &str = "https://bio.example/cell";
  const PAGE: &str = "<html><body><p>Mitochondria is the powerhouse of the cell.</p>\
                      <p>The powerhouse of the cell makes ATP.</p></body></html>";

  fn resolver() -> AnchorResolver { AnchorResolver::default() }

  fn current(n: i64) -> AnnotationRef { AnnotationRef::current(HighlightId(n)) }

  #[test]
  fn locate_scans_in_document_order() {
    let doc = Document::parse(PAGE).unwrap();
    let found = resolver().locate(&doc, "powerhouse of the cell");
    assert_eq!(found.len(), 2);
    assert!(doc.text(found[0]).unwrap().starts_with("Mitochondria"));
    assert!(resolver().locate(&doc, "").is_empty());
    assert!(resolver().locate(&doc, "ribosome").is_empty());
  }

  #[test]
  fn anchor_survives_reload() {
    let mut doc = Document::parse(PAGE).unwrap();
    let r = resolver();
    let range = r.find(&doc, "powerhouse of the cell").unwrap();
    let placed = r.anchor(&mut doc, &range, current(7)).unwrap();
    assert_eq!(placed.strategy, WrapStrategy::Surround);

    // Reload: markers are not part of the stored page, so start from the
    // original markup and restore from the record.
    let mut reloaded = Document::parse(PAGE).unwrap();
    let placed = r
      .restore(&mut reloaded, "powerhouse of the cell", current(7))
      .unwrap();
    assert_eq!(reloaded.text_content(placed.marker.node), "powerhouse of the cell");
    assert_eq!(reloaded.attr(placed.marker.node, CURRENT_ATTR), Some("7"));
    let fresh = Document::parse(PAGE).unwrap();
    assert_eq!(
      reloaded.text_content(reloaded.body()),
      fresh.text_content(fresh.body())
    );

    // The marked markup itself also reparses with the marker intact.
    let again = Document::parse(&reloaded.to_markup().unwrap()).unwrap();
    let markers = r.markers(&again, URL);
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].annotation, current(7));
  }

  #[test]
  fn only_first_occurrence_is_marked() {
    let mut doc = Document::parse(PAGE).unwrap();
    let r = resolver();
    let placed = r.restore(&mut doc, "powerhouse of the cell", current(1)).unwrap();

    let markers = r.markers(&doc, URL);
    assert_eq!(markers.len(), 1);
    let first_p = doc.children(doc.body())[0];
    assert!(doc.is_inclusive_ancestor(first_p, placed.marker.node));
  }

  #[test]
  fn restore_reports_missing_text() {
    let mut doc = Document::parse(PAGE).unwrap();
    let err = resolver().restore(&mut doc, "ribosome", current(1)).unwrap_err();
    assert!(matches!(err, Error::AnchorNotFound(_)));
  }

  #[test]
  fn raw_text_is_never_wrapped() {
    let mut doc =
      Document::parse("<html><head><title>cell</title></head><body><p>x</p></body></html>")
        .unwrap();
    // `title` sits outside the body, so search the whole document.
    let title_text = doc.text_nodes(doc.root()).next().unwrap();
    let range = Range::in_text(title_text, 0, 4);
    let placed = resolver().anchor(&mut doc, &range, current(1)).unwrap();
    assert_eq!(placed.strategy, WrapStrategy::Overlay);
    assert_eq!(doc.text(title_text), Some("cell"));
    assert_eq!(doc.parent(placed.marker.node), Some(doc.body()));

    let mut doc = Document::parse("<body><script>cell()</script></body>").unwrap();
    let err = resolver().restore(&mut doc, "cell", current(1)).unwrap_err();
    assert!(matches!(err, Error::AnchorWriteFailed(_)));
  }

  #[test]
  fn partial_element_falls_back_to_extract() {
    let mut doc = Document::parse("<body><p>Hello <b>bold</b> world</p></body>").unwrap();
    let texts: Vec<_> = doc.text_nodes(doc.root()).collect();
    let range = Range::new(
      Boundary { node: texts[1], offset: 1 },
      Boundary { node: texts[2], offset: 2 },
    );
    let placed = resolver().anchor(&mut doc, &range, current(3)).unwrap();
    assert_eq!(placed.strategy, WrapStrategy::Extract);
    assert_eq!(doc.text_content(placed.marker.node), "old w");
    assert_eq!(doc.text_content(doc.body()), "Hello bold world");
  }

  #[test]
  fn markers_do_not_nest() {
    let mut doc = Document::parse(PAGE).unwrap();
    let r = resolver();
    r.restore(&mut doc, "powerhouse of the cell", current(1)).unwrap();
    // The second restore of the same text lands on the other paragraph.
    let second = r.restore(&mut doc, "powerhouse", current(2)).unwrap();
    let second_p = doc.children(doc.body())[1];
    assert!(doc.is_inclusive_ancestor(second_p, second.marker.node));
    assert_eq!(r.markers(&doc, URL).len(), 2);
  }

  #[test]
  fn unanchor_restores_original_shape() {
    let original = Document::parse(PAGE).unwrap().to_markup().unwrap();
    let mut doc = Document::parse(PAGE).unwrap();
    let r = resolver();
    let placed = r.restore(&mut doc, "powerhouse of the cell", current(4)).unwrap();
    assert_ne!(doc.to_markup().unwrap(), original);

    r.unanchor(&mut doc, placed.marker.node).unwrap();
    assert_eq!(doc.to_markup().unwrap(), original);
    assert!(r.markers(&doc, URL).is_empty());
  }

  #[test]
  fn unanchor_rejects_plain_nodes() {
    let mut doc = Document::parse(PAGE).unwrap();
    let p = doc.children(doc.body())[0];
    assert!(matches!(
      resolver().unanchor(&mut doc, p),
      Err(Error::NotAMarker(_))
    ));
  }

  #[test]
  fn marker_at_distinguishes_legacy_and_current() {
    let mut doc = Document::parse(PAGE).unwrap();
    let r = resolver();
    let legacy = r
      .restore(&mut doc, "Mitochondria", AnnotationRef::legacy("Mitochondria", URL))
      .unwrap();
    let current_marker = r.restore(&mut doc, "makes ATP", current(9)).unwrap();

    let inner = doc.children(legacy.marker.node)[0];
    let found = r.marker_at(&doc, inner, URL).unwrap();
    assert_eq!(found.annotation, AnnotationRef::legacy("Mitochondria", URL));
    assert_eq!(doc.attr(found.node, LEGACY_ATTR), Some("true"));

    let found = r.marker_at(&doc, current_marker.marker.node, URL).unwrap();
    assert_eq!(found.annotation, current(9));

    let plain = doc.children(doc.body())[0];
    assert!(r.marker_at(&doc, plain, URL).is_none());
  }

  #[test]
  fn selection_captures_locators() {
    let doc = Document::parse(PAGE).unwrap();
    let r = resolver();
    let range = r.find(&doc, "powerhouse").unwrap();
    let sel = r.selection(&doc, &range, 8).unwrap().unwrap();
    assert_eq!(sel.text, "powerhouse");
    assert_eq!(sel.locators.xpath, "/html[1]/body[1]/p[1]/text()[1]");
    assert_eq!(sel.locators.offset, LocatorOffset { start: 20, end: 30 });
    assert_eq!(sel.locators.context.before, " is the ");
    assert_eq!(sel.locators.context.after, " of the ");
  }

  #[test]
  fn whitespace_selection_is_ignored() {
    let doc = Document::parse("<body><p>a   b</p></body>").unwrap();
    let t = doc.text_nodes(doc.root()).next().unwrap();
    let sel = resolver().selection(&doc, &Range::in_text(t, 1, 4), 50).unwrap();
    assert!(sel.is_none());
  }
}
