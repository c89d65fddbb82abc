//! An arena-backed document tree of element and text nodes.
//!
//! Nodes are addressed by [`NodeId`]. Removing a node detaches it from its
//! parent but leaves it in the arena, so handles held by callers stay valid
//! (they simply stop being reachable from the root).

use crate::{Error, Result};

/// Elements whose text content is never rendered as flowing text and can
/// never hold a marker.
pub const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Elements that never have children, even when the markup opens them
/// without a self-closing slash.
pub const VOID_ELEMENTS: &[&str] = &[
  "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta",
  "source", "track", "wbr",
];

// ─── Nodes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
  /// The synthetic root holding the top-level nodes.
  Document,
  Element {
    name:  String,
    attrs: Vec<(String, String)>,
  },
  Text(String),
}

#[derive(Debug, Clone)]
struct Node {
  parent:   Option<NodeId>,
  children: Vec<NodeId>,
  data:     NodeData,
}

// ─── Document ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Document {
  nodes: Vec<Node>,
}

impl Default for Document {
  fn default() -> Self { Self::new() }
}

impl Document {
  pub fn new() -> Self {
    Self {
      nodes: vec![Node {
        parent:   None,
        children: Vec::new(),
        data:     NodeData::Document,
      }],
    }
  }

  pub fn root(&self) -> NodeId { NodeId(0) }

  /// The first `body` element in document order, or the root when the
  /// document has none.
  pub fn body(&self) -> NodeId {
    self
      .descendants(self.root())
      .find(|&id| self.tag_name(id).is_some_and(|n| n.eq_ignore_ascii_case("body")))
      .unwrap_or(self.root())
  }

  // ── Accessors ─────────────────────────────────────────────────────────

  pub fn data(&self, id: NodeId) -> &NodeData { &self.nodes[id.0].data }

  pub fn parent(&self, id: NodeId) -> Option<NodeId> { self.nodes[id.0].parent }

  pub fn children(&self, id: NodeId) -> &[NodeId] { &self.nodes[id.0].children }

  pub fn is_text(&self, id: NodeId) -> bool {
    matches!(self.data(id), NodeData::Text(_))
  }

  pub fn text(&self, id: NodeId) -> Option<&str> {
    match self.data(id) {
      NodeData::Text(t) => Some(t),
      _ => None,
    }
  }

  pub fn tag_name(&self, id: NodeId) -> Option<&str> {
    match self.data(id) {
      NodeData::Element { name, .. } => Some(name),
      _ => None,
    }
  }

  pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
    match self.data(id) {
      NodeData::Element { attrs, .. } => attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str()),
      _ => None,
    }
  }

  /// Length of a node in range-offset units: bytes for text, child count
  /// otherwise.
  pub fn node_len(&self, id: NodeId) -> usize {
    match self.data(id) {
      NodeData::Text(t) => t.len(),
      _ => self.children(id).len(),
    }
  }

  pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
    let parent = self.parent(id)?;
    self.children(parent).iter().position(|&c| c == id)
  }

  /// Whether `id` is reachable from the root.
  pub fn is_attached(&self, id: NodeId) -> bool {
    self.ancestors(id).last() == Some(self.root())
  }

  /// `id` followed by each of its ancestors up to the root.
  pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    std::iter::successors(Some(id), |&n| self.parent(n))
  }

  pub fn is_inclusive_ancestor(&self, ancestor: NodeId, of: NodeId) -> bool {
    self.ancestors(of).any(|n| n == ancestor)
  }

  /// The closest inclusive ancestor matching `pred`.
  pub fn closest(
    &self,
    id: NodeId,
    mut pred: impl FnMut(NodeId) -> bool,
  ) -> Option<NodeId> {
    self.ancestors(id).find(|&n| pred(n))
  }

  /// Whether `id` sits inside an element whose text is never rendered.
  pub fn in_raw_text(&self, id: NodeId) -> bool {
    self
      .closest(id, |n| {
        self
          .tag_name(n)
          .is_some_and(|name| RAW_TEXT_ELEMENTS.iter().any(|r| name.eq_ignore_ascii_case(r)))
      })
      .is_some()
  }

  /// Depth-first, pre-order traversal starting at (and including) `id`.
  pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
    Descendants { doc: self, stack: vec![id] }
  }

  /// Text nodes under `id`, in document order.
  pub fn text_nodes(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    self.descendants(id).filter(|&n| self.is_text(n))
  }

  /// The last node of `id`'s subtree in pre-order (`id` itself if it has no
  /// children).
  pub fn last_descendant(&self, id: NodeId) -> NodeId {
    let mut cur = id;
    while let Some(&last) = self.children(cur).last() {
      cur = last;
    }
    cur
  }

  /// Concatenated text of every text node under `id`.
  pub fn text_content(&self, id: NodeId) -> String {
    self
      .text_nodes(id)
      .filter_map(|n| self.text(n))
      .collect()
  }

  // ── Construction ──────────────────────────────────────────────────────

  fn push(&mut self, data: NodeData) -> NodeId {
    let id = NodeId(self.nodes.len());
    self.nodes.push(Node { parent: None, children: Vec::new(), data });
    id
  }

  pub fn create_element(&mut self, name: impl Into<String>) -> NodeId {
    self.push(NodeData::Element { name: name.into(), attrs: Vec::new() })
  }

  pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
    self.push(NodeData::Text(text.into()))
  }

  // ── Mutation ──────────────────────────────────────────────────────────

  pub fn set_attr(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
    if let NodeData::Element { attrs, .. } = &mut self.nodes[id.0].data {
      let value = value.into();
      match attrs.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value,
        None => attrs.push((key.to_owned(), value)),
      }
    }
  }

  pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
    if let NodeData::Text(t) = &mut self.nodes[id.0].data {
      *t = text.into();
    }
  }

  /// Remove `id` from its parent. A no-op for detached nodes.
  pub fn detach(&mut self, id: NodeId) {
    if let Some(parent) = self.nodes[id.0].parent.take() {
      self.nodes[parent.0].children.retain(|&c| c != id);
    }
  }

  /// Insert `child` into `parent` at `index` (clamped), detaching it from
  /// wherever it was first.
  pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
    self.detach(child);
    let siblings = &mut self.nodes[parent.0].children;
    let index = index.min(siblings.len());
    siblings.insert(index, child);
    self.nodes[child.0].parent = Some(parent);
  }

  pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
    let len = self.children(parent).len();
    self.insert_child(parent, len, child);
  }

  /// Split a text node at byte `offset`. The original node keeps the text
  /// before `offset`; the returned new sibling holds the rest.
  pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId> {
    let text = self
      .text(id)
      .ok_or_else(|| Error::InvalidRange(format!("{id:?} is not a text node")))?;
    if offset > text.len() || !text.is_char_boundary(offset) {
      return Err(Error::InvalidRange(format!(
        "offset {offset} is not a character boundary of {id:?}"
      )));
    }
    let tail = text[offset..].to_owned();
    let head = text[..offset].to_owned();

    let parent = self.parent(id).ok_or(Error::Detached(id))?;
    let index = self.index_in_parent(id).ok_or(Error::Detached(id))?;
    self.set_text(id, head);
    let right = self.create_text(tail);
    self.insert_child(parent, index + 1, right);
    Ok(right)
  }

  /// Replace `id` with its children, in place.
  pub fn unwrap_node(&mut self, id: NodeId) -> Result<()> {
    let parent = self.parent(id).ok_or(Error::Detached(id))?;
    let index = self.index_in_parent(id).ok_or(Error::Detached(id))?;
    let children = self.children(id).to_vec();
    self.detach(id);
    for (i, child) in children.into_iter().enumerate() {
      self.insert_child(parent, index + i, child);
    }
    Ok(())
  }

  /// Merge adjacent text children of `id` and drop empty ones.
  pub fn normalize(&mut self, id: NodeId) {
    let children = self.children(id).to_vec();
    let mut run: Option<NodeId> = None;
    for child in children {
      let Some(text) = self.text(child).map(str::to_owned) else {
        run = None;
        continue;
      };
      match run {
        Some(head) => {
          let merged = format!("{}{}", self.text(head).unwrap_or_default(), text);
          self.set_text(head, merged);
          self.detach(child);
        }
        None if text.is_empty() => self.detach(child),
        None => run = Some(child),
      }
    }
  }
}

// ─── Traversal ───────────────────────────────────────────────────────────────

/// Pre-order iterator returned by [`Document::descendants`].
pub struct Descendants<'a> {
  doc:   &'a Document,
  stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
  type Item = NodeId;

  fn next(&mut self) -> Option<NodeId> {
    let id = self.stack.pop()?;
    self.stack.extend(self.doc.children(id).iter().rev());
    Some(id)
  }
}
