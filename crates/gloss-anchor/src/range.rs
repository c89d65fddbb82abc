//! Live ranges over a [`Document`] and the two structural edits the resolver
//! needs: surrounding a range with a wrapper, and replacing a range's
//! contents with a wrapper holding its flattened text.
//!
//! Boundary semantics follow the DOM: in a text node the offset counts bytes
//! of its text, in any other node it counts children.

use std::{cmp::Ordering, collections::HashMap};

use crate::{
  Error, Result,
  document::{Document, NodeId},
};

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
  pub node:   NodeId,
  pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
  pub start: Boundary,
  pub end:   Boundary,
}

impl Range {
  pub fn new(start: Boundary, end: Boundary) -> Self { Self { start, end } }

  /// A range covering `start..end` of a single text node.
  pub fn in_text(node: NodeId, start: usize, end: usize) -> Self {
    Self {
      start: Boundary { node, offset: start },
      end:   Boundary { node, offset: end },
    }
  }
}

/// Why a surround was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurroundRejection {
  /// The range partially contains an element, so wrapping it would split
  /// that element.
  PartialElement,
}

// ─── Document-order positions ────────────────────────────────────────────────

/// Pre-order index of every attached node.
struct Order(HashMap<NodeId, usize>);

impl Order {
  fn of(doc: &Document) -> Self {
    Self(
      doc
        .descendants(doc.root())
        .enumerate()
        .map(|(i, n)| (n, i))
        .collect(),
    )
  }

  fn pre(&self, id: NodeId) -> usize {
    self.0.get(&id).copied().unwrap_or(usize::MAX)
  }

  /// A totally ordered key for a boundary point. Element boundaries sort just
  /// before the node they precede; text boundaries sort by byte offset.
  fn key(&self, doc: &Document, b: Boundary) -> (usize, isize) {
    if doc.is_text(b.node) {
      return (self.pre(b.node), b.offset as isize);
    }
    match doc.children(b.node).get(b.offset) {
      Some(&child) => (self.pre(child), -1),
      None => (self.pre(doc.last_descendant(b.node)).saturating_add(1), -1),
    }
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

impl Document {
  /// Check that both boundaries are attached, in bounds, on character
  /// boundaries, and that start does not come after end.
  pub fn validate_range(&self, r: &Range) -> Result<()> {
    for b in [r.start, r.end] {
      if !self.is_attached(b.node) {
        return Err(Error::Detached(b.node));
      }
      if b.offset > self.node_len(b.node) {
        return Err(Error::InvalidRange(format!(
          "offset {} past the end of {:?}",
          b.offset, b.node
        )));
      }
      if let Some(t) = self.text(b.node)
        && !t.is_char_boundary(b.offset)
      {
        return Err(Error::InvalidRange(format!(
          "offset {} splits a character in {:?}",
          b.offset, b.node
        )));
      }
    }
    if self.compare_boundaries(r.start, r.end) == Ordering::Greater {
      return Err(Error::InvalidRange("start is after end".into()));
    }
    Ok(())
  }

  /// Document-order comparison of two attached boundary points.
  pub fn compare_boundaries(&self, a: Boundary, b: Boundary) -> Ordering {
    let order = Order::of(self);
    order.key(self, a).cmp(&order.key(self, b))
  }

  /// Whether `r` covers any part of one of `nodes`. Document order is
  /// computed once for the whole batch.
  pub fn range_touches(&self, r: &Range, nodes: impl IntoIterator<Item = NodeId>) -> bool {
    let order = Order::of(self);
    let start = order.key(self, r.start);
    let end = order.key(self, r.end);
    nodes.into_iter().any(|n| {
      let (Some(parent), Some(index)) = (self.parent(n), self.index_in_parent(n)) else {
        return false;
      };
      let before = order.key(self, Boundary { node: parent, offset: index });
      let after = order.key(self, Boundary { node: parent, offset: index + 1 });
      before < end && start < after
    })
  }

  /// The deepest node that is an inclusive ancestor of both boundaries'
  /// containers.
  pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> NodeId {
    self
      .ancestors(b)
      .find(|&n| self.is_inclusive_ancestor(n, a))
      .unwrap_or(self.root())
  }

  /// The text a range covers (`Range.toString()`).
  pub fn range_text(&self, r: &Range) -> String {
    let order = Order::of(self);
    let start = order.key(self, r.start);
    let end = order.key(self, r.end);

    let mut out = String::new();
    for node in self.text_nodes(self.root()) {
      let pre = order.pre(node);
      let text = self.text(node).unwrap_or_default();
      let lo = match pre.cmp(&start.0) {
        Ordering::Less => continue,
        Ordering::Equal => start.1.max(0) as usize,
        Ordering::Greater => 0,
      };
      let hi = match pre.cmp(&end.0) {
        Ordering::Greater => break,
        Ordering::Equal => end.1.max(0) as usize,
        Ordering::Less => text.len(),
      };
      if lo < hi && hi <= text.len() {
        out.push_str(&text[lo..hi]);
      }
    }
    out
  }

  // ── Edits ─────────────────────────────────────────────────────────────

  /// Move the range's contents into `wrapper` and put `wrapper` where they
  /// were (`Range.surroundContents`).
  ///
  /// Refused when the range partially contains any non-text node; boundary
  /// text nodes are split as needed. Returns `Ok(Err(..))` for a refusal so
  /// callers can fall back without treating it as a failure.
  pub fn surround(
    &mut self,
    r: &Range,
    wrapper: NodeId,
  ) -> Result<Result<(), SurroundRejection>> {
    self.validate_range(r)?;
    let (start, end) = (r.start, r.end);
    let ca = self.common_ancestor(start.node, end.node);

    // Text containers inside a single node: split twice and wrap the middle.
    if start.node == end.node && self.is_text(start.node) {
      let node = start.node;
      let parent = self.parent(node).ok_or(Error::Detached(node))?;
      if end.offset < self.node_len(node) {
        self.split_text(node, end.offset)?;
      }
      let middle = if start.offset > 0 {
        self.split_text(node, start.offset)?
      } else {
        node
      };
      let index = self.index_in_parent(middle).ok_or(Error::Detached(middle))?;
      self.insert_child(parent, index, wrapper);
      self.append_child(wrapper, middle);
      return Ok(Ok(()));
    }

    let partial = |doc: &Document, n: NodeId| {
      n != ca && !(doc.is_text(n) && doc.parent(n) == Some(ca))
    };
    if partial(self, start.node) || partial(self, end.node) {
      return Ok(Err(SurroundRejection::PartialElement));
    }

    // End first: splitting it never shifts the start position.
    let mut end_index = if end.node == ca {
      end.offset
    } else {
      let idx = self.index_in_parent(end.node).ok_or(Error::Detached(end.node))?;
      if end.offset == 0 {
        idx
      } else {
        if end.offset < self.node_len(end.node) {
          self.split_text(end.node, end.offset)?;
        }
        idx + 1
      }
    };

    let start_index = if start.node == ca {
      start.offset
    } else {
      let idx = self
        .index_in_parent(start.node)
        .ok_or(Error::Detached(start.node))?;
      if start.offset == 0 {
        idx
      } else if start.offset == self.node_len(start.node) {
        idx + 1
      } else {
        self.split_text(start.node, start.offset)?;
        end_index += 1;
        idx + 1
      }
    };

    let moved: Vec<NodeId> = self.children(ca)[start_index..end_index.max(start_index)].to_vec();
    self.insert_child(ca, start_index, wrapper);
    for node in moved {
      self.append_child(wrapper, node);
    }
    Ok(Ok(()))
  }

  /// Delete everything the range covers and insert `wrapper` holding the
  /// covered text as a single text node. Elements that were only partially
  /// covered stay behind with their uncovered parts; formatting inside the
  /// range is lost.
  pub fn replace_with_flattened(&mut self, r: &Range, wrapper: NodeId) -> Result<()> {
    self.validate_range(r)?;
    let text = self.range_text(r);
    let (start, end) = (r.start, r.end);

    let order = Order::of(self);
    let lo = if self.is_text(start.node) {
      order.pre(start.node).saturating_add(1)
    } else {
      order.key(self, start).0
    };
    let hi = if self.is_text(end.node) {
      order.pre(end.node)
    } else {
      order.key(self, end).0
    };

    // Top-most nodes lying entirely inside the range.
    let ca = self.common_ancestor(start.node, end.node);
    let contained: Vec<NodeId> = self
      .descendants(ca)
      .filter(|&n| n != ca)
      .filter(|&n| {
        !self.is_inclusive_ancestor(n, start.node)
          && !self.is_inclusive_ancestor(n, end.node)
          && order.pre(n) >= lo
          && order.pre(self.last_descendant(n)) < hi
      })
      .collect();
    for &n in &contained {
      let parent_contained = self.parent(n).is_some_and(|p| contained.contains(&p));
      if !parent_contained {
        self.detach(n);
      }
    }

    // Trim the boundary text nodes and find where the wrapper goes.
    let (parent, index) = if self.is_text(start.node) {
      let s = self.text(start.node).unwrap_or_default().to_owned();
      if start.node == end.node {
        self.set_text(start.node, &s[..start.offset]);
        let rest = self.create_text(&s[end.offset..]);
        let parent = self.parent(start.node).ok_or(Error::Detached(start.node))?;
        let idx = self.index_in_parent(start.node).ok_or(Error::Detached(start.node))?;
        self.insert_child(parent, idx + 1, rest);
      } else {
        self.set_text(start.node, &s[..start.offset]);
      }
      let parent = self.parent(start.node).ok_or(Error::Detached(start.node))?;
      let idx = self.index_in_parent(start.node).ok_or(Error::Detached(start.node))?;
      (parent, idx + 1)
    } else {
      (start.node, start.offset)
    };
    if start.node != end.node && self.is_text(end.node) {
      let e = self.text(end.node).unwrap_or_default().to_owned();
      self.set_text(end.node, &e[end.offset..]);
    }

    let body = self.create_text(text);
    self.append_child(wrapper, body);
    self.insert_child(parent, index, wrapper);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn doc(markup: &str) -> Document { Document::parse(markup).unwrap() }

  #[test]
  fn range_touches_only_overlapping_nodes() {
    let d = doc("<body><p>Hello <b>bold</b> world</p></body>");
    let bold = d
      .descendants(d.root())
      .find(|&n| d.tag_name(n) == Some("b"))
      .unwrap();
    let hello = first_text_containing(&d, "Hello");
    let world = first_text_containing(&d, "world");

    assert!(!d.range_touches(&Range::in_text(hello, 0, 5), [bold]));
    assert!(!d.range_touches(&Range::in_text(world, 1, 6), [bold]));
    assert!(d.range_touches(&Range::in_text(d.children(bold)[0], 1, 3), [bold]));
    let across = Range::new(
      Boundary { node: hello, offset: 3 },
      Boundary { node: world, offset: 2 },
    );
    assert!(d.range_touches(&across, [bold]));
    assert!(!d.range_touches(&across, std::iter::empty()));
  }

  fn first_text_containing(d: &Document, needle: &str) -> NodeId {
    d.text_nodes(d.root())
      .find(|&n| d.text(n).is_some_and(|t| t.contains(needle)))
      .unwrap()
  }

  #[test]
  fn range_text_across_elements() {
    let d = doc("<body><p>Hello <b>bold</b> world</p></body>");
    let hello = first_text_containing(&d, "Hello");
    let world = first_text_containing(&d, "world");
    let r = Range::new(
      Boundary { node: hello, offset: 2 },
      Boundary { node: world, offset: 2 },
    );
    assert_eq!(d.range_text(&r), "llo bold w");
  }

  #[test]
  fn surround_within_one_text_node() {
    let mut d = doc("<body><p>the powerhouse of the cell</p></body>");
    let t = first_text_containing(&d, "powerhouse");
    let span = d.create_element("span");
    d.surround(&Range::in_text(t, 4, 14), span).unwrap().unwrap();
    assert_eq!(d.text_content(span), "powerhouse");
    assert_eq!(
      d.inner_markup(d.body()).unwrap(),
      "<p>the <span>powerhouse</span> of the cell</p>"
    );
  }

  #[test]
  fn surround_sibling_text_and_element() {
    let mut d = doc("<body><p>Hello <b>bold</b> world</p></body>");
    let hello = first_text_containing(&d, "Hello");
    let world = first_text_containing(&d, "world");
    let span = d.create_element("span");
    let r = Range::new(
      Boundary { node: hello, offset: 2 },
      Boundary { node: world, offset: 2 },
    );
    d.surround(&r, span).unwrap().unwrap();
    assert_eq!(
      d.inner_markup(d.body()).unwrap(),
      "<p>He<span>llo <b>bold</b> w</span>orld</p>"
    );
  }

  #[test]
  fn surround_refuses_partial_element() {
    let mut d = doc("<body><p>Hello <b>bold</b> world</p></body>");
    let bold = first_text_containing(&d, "bold");
    let world = first_text_containing(&d, "world");
    let span = d.create_element("span");
    let r = Range::new(
      Boundary { node: bold, offset: 1 },
      Boundary { node: world, offset: 2 },
    );
    let before = d.to_markup().unwrap();
    assert_eq!(
      d.surround(&r, span).unwrap(),
      Err(SurroundRejection::PartialElement)
    );
    assert_eq!(d.to_markup().unwrap(), before);
  }

  #[test]
  fn flatten_partial_element() {
    let mut d = doc("<body><p>Hello <b>bold</b> world</p></body>");
    let bold = first_text_containing(&d, "bold");
    let world = first_text_containing(&d, "world");
    let span = d.create_element("span");
    let r = Range::new(
      Boundary { node: bold, offset: 1 },
      Boundary { node: world, offset: 2 },
    );
    d.replace_with_flattened(&r, span).unwrap();
    assert_eq!(d.text_content(span), "old w");
    assert_eq!(d.text_content(d.body()), "Hello bold world");
    assert_eq!(
      d.inner_markup(d.body()).unwrap(),
      "<p>Hello <b>b<span>old w</span></b>orld</p>"
    );
  }

  #[test]
  fn flatten_removes_fully_covered_elements() {
    let mut d = doc("<body><p>a</p><p>b <i>c</i></p><p>d</p></body>");
    let a = first_text_containing(&d, "a");
    let dd = first_text_containing(&d, "d");
    let span = d.create_element("span");
    let r = Range::new(
      Boundary { node: a, offset: 0 },
      Boundary { node: dd, offset: 1 },
    );
    d.replace_with_flattened(&r, span).unwrap();
    assert_eq!(d.text_content(span), "ab cd");
    assert_eq!(
      d.inner_markup(d.body()).unwrap(),
      "<p><span>ab cd</span></p><p></p>"
    );
  }

  #[test]
  fn backwards_range_is_invalid() {
    let d = doc("<body><p>abc</p></body>");
    let t = first_text_containing(&d, "abc");
    assert!(d.validate_range(&Range::in_text(t, 2, 1)).is_err());
    assert!(d.validate_range(&Range::in_text(t, 0, 9)).is_err());
  }
}
