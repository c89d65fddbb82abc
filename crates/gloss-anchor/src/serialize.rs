//! [`Document`] → markup using `quick-xml`'s writer API.
//!
//! Output re-parses into an equivalent tree with [`Document::parse`], which is
//! how a reload is simulated.

use std::io::Cursor;

use quick_xml::{
  Writer,
  events::{BytesEnd, BytesStart, BytesText, Event},
};

use crate::{
  Error, Result,
  document::{Document, NodeData, NodeId, RAW_TEXT_ELEMENTS, VOID_ELEMENTS},
  parse::is_escapable_raw_text,
};

impl Document {
  /// Serialise the whole document.
  pub fn to_markup(&self) -> Result<String> { self.inner_markup(self.root()) }

  /// Serialise the children of `id` (the equivalent of `innerHTML`).
  pub fn inner_markup(&self, id: NodeId) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    for &child in self.children(id) {
      write_node(self, child, &mut writer)?;
    }
    String::from_utf8(writer.into_inner().into_inner())
      .map_err(|e| Error::Serialize(e.to_string()))
  }

  /// Serialise `id` itself, including its own tag (`outerHTML`).
  pub fn outer_markup(&self, id: NodeId) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_node(self, id, &mut writer)?;
    String::from_utf8(writer.into_inner().into_inner())
      .map_err(|e| Error::Serialize(e.to_string()))
  }
}

fn write_node(
  doc: &Document,
  id: NodeId,
  w: &mut Writer<Cursor<Vec<u8>>>,
) -> Result<()> {
  match doc.data(id) {
    NodeData::Document => {
      for &child in doc.children(id) {
        write_node(doc, child, w)?;
      }
    }
    NodeData::Text(text) => {
      let verbatim = doc
        .parent(id)
        .and_then(|p| doc.tag_name(p))
        .is_some_and(|name| {
          RAW_TEXT_ELEMENTS.iter().any(|r| name.eq_ignore_ascii_case(r))
            && !is_escapable_raw_text(name)
        });
      let text = if verbatim { BytesText::from_escaped(text.as_str()) } else { BytesText::new(text) };
      emit(w, Event::Text(text))?;
    }
    NodeData::Element { name, attrs } => {
      let mut start = BytesStart::new(name.as_str());
      for (k, v) in attrs {
        start.push_attribute((k.as_str(), v.as_str()));
      }

      let children = doc.children(id);
      if children.is_empty() && VOID_ELEMENTS.iter().any(|v| name.eq_ignore_ascii_case(v)) {
        emit(w, Event::Empty(start))?;
        return Ok(());
      }

      emit(w, Event::Start(start))?;
      for &child in children {
        write_node(doc, child, w)?;
      }
      emit(w, Event::End(BytesEnd::new(name.as_str())))?;
    }
  }
  Ok(())
}

fn emit(w: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<()> {
  w.write_event(event)
    .map_err(|e| Error::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reparse_yields_same_markup() {
    let src = "<html><body><p class=\"a&amp;b\">x &lt; y <i>z</i></p><br/></body></html>";
    let doc = Document::parse(src).unwrap();
    let out = doc.to_markup().unwrap();
    let again = Document::parse(&out).unwrap().to_markup().unwrap();
    assert_eq!(out, again);
    assert_eq!(
      Document::parse(&out).unwrap().text_content(doc.root()),
      "x < y z"
    );
  }

  #[test]
  fn script_is_written_verbatim() {
    let src = "<head><script>if (a < b && c) go();</script><title>A &amp; B</title></head>";
    let out = Document::parse(src).unwrap().to_markup().unwrap();
    assert_eq!(out, src);
  }

  #[test]
  fn inner_and_outer_markup() {
    let doc = Document::parse("<body><p>hi</p></body>").unwrap();
    let body = doc.body();
    assert_eq!(doc.inner_markup(body).unwrap(), "<p>hi</p>");
    assert_eq!(doc.outer_markup(body).unwrap(), "<body><p>hi</p></body>");
  }

  #[test]
  fn empty_non_void_element_keeps_end_tag() {
    let doc = Document::parse("<body><div/></body>").unwrap();
    assert_eq!(doc.inner_markup(doc.body()).unwrap(), "<div></div>");
  }
}
