//! Markup → [`Document`] using `quick-xml`'s pull reader.
//!
//! The reader is lenient enough for ordinary pages: void elements (`<br>`)
//! never take children, a stray end tag closes up to its nearest matching
//! open element or is ignored, attributes may be bare or unquoted, and an
//! entity the reader does not know is kept as written. `<script>` and
//! `<style>` content is taken verbatim up to the closing tag; `<title>` and
//! `<textarea>` content only has its entities decoded. Comments, processing
//! instructions and doctypes are dropped.

use quick_xml::{
  Reader,
  escape::{resolve_predefined_entity, unescape_with},
  events::{BytesStart, Event},
};

use crate::{
  Error, Result,
  document::{Document, NodeId, RAW_TEXT_ELEMENTS, VOID_ELEMENTS},
};

impl Document {
  /// Parse `markup` into a fresh document. Every call yields new node ids;
  /// nothing survives from a previous parse of the same markup.
  pub fn parse(markup: &str) -> Result<Document> {
    let mut doc = Document::new();
    let mut stack: Vec<NodeId> = vec![doc.root()];

    // Raw-text content is cut out by hand, so the reader restarts after it.
    let mut offset = 0;
    while offset < markup.len() {
      offset = parse_from(markup, offset, &mut doc, &mut stack)?;
    }

    Ok(doc)
  }
}

/// Feed `markup[base..]` through a reader until the end of input or the start
/// of a raw-text element. Returns the byte offset to resume from.
fn parse_from(
  markup: &str,
  base: usize,
  doc: &mut Document,
  stack: &mut Vec<NodeId>,
) -> Result<usize> {
  let mut reader = Reader::from_str(&markup[base..]);
  let config = reader.config_mut();
  config.check_end_names = false;
  config.allow_unmatched_ends = true;

  let position = |reader: &Reader<&[u8]>| base as u64 + reader.buffer_position();

  loop {
    let event = reader.read_event().map_err(|e| Error::Parse {
      position: position(&reader),
      message:  e.to_string(),
    })?;

    match event {
      Event::Start(ref e) => {
        let el = element(doc, e).map_err(|message| Error::Parse {
          position: position(&reader),
          message,
        })?;
        let parent = *stack.last().unwrap_or(&doc.root());
        doc.append_child(parent, el);

        let name = doc.tag_name(el).unwrap_or_default().to_owned();
        if is_one_of(&name, RAW_TEXT_ELEMENTS) {
          let start = base + reader.buffer_position() as usize;
          let (end, resume) = raw_text_end(markup, start, &name);
          let raw = &markup[start..end];
          let text = if is_escapable_raw_text(&name) { unescape_lenient(raw) } else { raw.to_owned() };
          push_text(doc, el, text);
          return Ok(resume);
        }
        if !is_one_of(&name, VOID_ELEMENTS) {
          stack.push(el);
        }
      }
      Event::Empty(ref e) => {
        let el = element(doc, e).map_err(|message| Error::Parse {
          position: position(&reader),
          message,
        })?;
        let parent = *stack.last().unwrap_or(&doc.root());
        doc.append_child(parent, el);
      }
      Event::End(ref e) => {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let open = stack
          .iter()
          .rposition(|&n| doc.tag_name(n).is_some_and(|t| t.eq_ignore_ascii_case(&name)));
        match open {
          Some(pos) if pos > 0 => stack.truncate(pos),
          _ => tracing::debug!(%name, "ignoring unmatched end tag"),
        }
      }
      Event::Text(ref t) => {
        let text = unescape_lenient(&String::from_utf8_lossy(t.as_ref()));
        let parent = *stack.last().unwrap_or(&doc.root());
        push_text(doc, parent, text);
      }
      Event::CData(ref c) => {
        let text = String::from_utf8_lossy(c.as_ref()).into_owned();
        let parent = *stack.last().unwrap_or(&doc.root());
        push_text(doc, parent, text);
      }
      Event::Eof => return Ok(markup.len()),
      _ => {}
    }
  }
}

fn element(doc: &mut Document, e: &BytesStart<'_>) -> std::result::Result<NodeId, String> {
  let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
  let el = doc.create_element(name);
  for attr in e.html_attributes() {
    let attr = attr.map_err(|err| err.to_string())?;
    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
    let value = unescape_lenient(&String::from_utf8_lossy(&attr.value));
    doc.set_attr(el, &key, value);
  }
  Ok(el)
}

/// Where the content of the raw-text element `name` opened at `start` ends,
/// and where parsing resumes after its end tag. An unclosed element runs to
/// the end of the input.
fn raw_text_end(markup: &str, start: usize, name: &str) -> (usize, usize) {
  let close = format!("</{}", name.to_ascii_lowercase());
  let Some(end) = markup[start..].to_ascii_lowercase().find(&close).map(|i| start + i) else {
    return (markup.len(), markup.len());
  };
  let resume = markup[end..].find('>').map_or(markup.len(), |i| end + i + 1);
  (end, resume)
}

/// Decode entities, keeping any reference the reader cannot resolve exactly
/// as written.
fn unescape_lenient(raw: &str) -> String {
  if let Ok(text) = unescape_with(raw, resolve_entity) {
    return text.into_owned();
  }

  let mut out = String::with_capacity(raw.len());
  let mut rest = raw;
  while let Some(amp) = rest.find('&') {
    out.push_str(&rest[..amp]);
    rest = &rest[amp..];

    let decoded = rest[1..]
      .find(|c: char| matches!(c, ';' | '&' | '<') || c.is_whitespace())
      .map(|i| i + 1)
      .filter(|&i| rest.as_bytes()[i] == b';')
      .and_then(|i| unescape_with(&rest[..=i], resolve_entity).ok().map(|t| (i, t)));
    match decoded {
      Some((i, text)) => {
        out.push_str(&text);
        rest = &rest[i + 1..];
      }
      None => {
        out.push('&');
        rest = &rest[1..];
      }
    }
  }
  out.push_str(rest);
  out
}

/// Append text to `parent`, merging with a preceding text sibling so entity
/// boundaries never split one run of text into several nodes.
fn push_text(doc: &mut Document, parent: NodeId, text: String) {
  if text.is_empty() {
    return;
  }
  if let Some(&last) = doc.children(parent).last()
    && let Some(prev) = doc.text(last)
  {
    let merged = format!("{prev}{text}");
    doc.set_text(last, merged);
    return;
  }
  let node = doc.create_text(text);
  doc.append_child(parent, node);
}

fn is_one_of(name: &str, set: &[&str]) -> bool {
  set.iter().any(|v| name.eq_ignore_ascii_case(v))
}

/// Raw-text elements whose content still has its entities decoded.
pub(crate) fn is_escapable_raw_text(name: &str) -> bool {
  is_one_of(name, &["title", "textarea"])
}

/// XML's predefined entities plus the handful of HTML ones that show up in
/// ordinary prose.
fn resolve_entity(entity: &str) -> Option<&'static str> {
  resolve_predefined_entity(entity).or(match entity {
    "nbsp" => Some("\u{a0}"),
    "ndash" => Some("\u{2013}"),
    "mdash" => Some("\u{2014}"),
    "hellip" => Some("\u{2026}"),
    "lsquo" => Some("\u{2018}"),
    "rsquo" => Some("\u{2019}"),
    "ldquo" => Some("\u{201c}"),
    "rdquo" => Some("\u{201d}"),
    "copy" => Some("\u{a9}"),
    _ => None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn body_text(markup: &str) -> String {
    let doc = Document::parse(markup).unwrap();
    doc.text_content(doc.body())
  }

  #[test]
  fn parses_nested_markup() {
    let doc = Document::parse(
      "<html><body><p class=\"lead\">Hello <b>bold</b> world</p></body></html>",
    )
    .unwrap();
    let body = doc.body();
    assert_eq!(doc.text_content(body), "Hello bold world");
    let p = doc.children(body)[0];
    assert_eq!(doc.attr(p, "class"), Some("lead"));
    assert_eq!(doc.children(p).len(), 3);
  }

  #[test]
  fn void_elements_take_no_children() {
    let doc = Document::parse("<body><p>one<br>two</p></body>").unwrap();
    let p = doc.children(doc.body())[0];
    assert_eq!(doc.children(p).len(), 3);
    assert_eq!(doc.text_content(p), "onetwo");
  }

  #[test]
  fn entities_are_decoded_and_merged() {
    let doc = Document::parse("<body><p>Fish &amp; chips&nbsp;today</p></body>").unwrap();
    let p = doc.children(doc.body())[0];
    assert_eq!(doc.children(p).len(), 1);
    assert_eq!(doc.text_content(p), "Fish & chips\u{a0}today");
  }

  #[test]
  fn unknown_entities_are_kept_as_written() {
    assert_eq!(
      body_text("<body><p>caf&eacute; &rarr; &amp; &#233; AT&T</p></body>"),
      "caf&eacute; &rarr; & \u{e9} AT&T"
    );
  }

  #[test]
  fn stray_end_tag_is_ignored() {
    assert_eq!(body_text("<body><p>text</span></p></body>"), "text");
  }

  #[test]
  fn end_tag_with_nothing_open_is_ignored() {
    assert_eq!(body_text("<body><p>text</p></body></div></html>"), "text");
  }

  #[test]
  fn bare_and_unquoted_attributes() {
    let doc = Document::parse("<body><input disabled><p class=lead>x</p></body>").unwrap();
    let children = doc.children(doc.body()).to_vec();
    assert_eq!(doc.attr(children[0], "disabled"), Some(""));
    assert_eq!(doc.attr(children[1], "class"), Some("lead"));
    assert_eq!(doc.text_content(children[1]), "x");
  }

  #[test]
  fn script_content_is_opaque() {
    let doc = Document::parse(
      "<html><head><script>if (a < b && c) { x = '</p>'; }</script></head>\
       <body><p>after</p></body></html>",
    )
    .unwrap();
    assert_eq!(doc.text_content(doc.body()), "after");
    let script = doc
      .descendants(doc.root())
      .find(|&n| doc.tag_name(n) == Some("script"))
      .unwrap();
    assert_eq!(doc.text_content(script), "if (a < b && c) { x = '</p>'; }");
  }

  #[test]
  fn title_decodes_entities_but_not_tags() {
    let doc = Document::parse("<head><title>Fish &amp; <b>chips</b></title></head>").unwrap();
    let title = doc
      .descendants(doc.root())
      .find(|&n| doc.tag_name(n) == Some("title"))
      .unwrap();
    assert_eq!(doc.text_content(title), "Fish & <b>chips</b>");
  }

  #[test]
  fn unclosed_script_runs_to_end() {
    let doc = Document::parse("<body><script>let a = 1 < 2;").unwrap();
    assert_eq!(doc.text_content(doc.body()), "let a = 1 < 2;");
  }

  #[test]
  fn comments_are_dropped() {
    let doc = Document::parse("<body><!-- note --><p>x</p></body>").unwrap();
    assert_eq!(doc.children(doc.body()).len(), 1);
  }

  #[test]
  fn duplicate_attribute_is_a_parse_error() {
    let err = Document::parse("<body><p class=\"a\" class=\"b\">x</p></body>").unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
  }
}
