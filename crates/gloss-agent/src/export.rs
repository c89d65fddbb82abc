//! Markdown export of flashcards, grouped by page.

use std::{collections::HashMap, fmt::Write as _};

use chrono::NaiveDate;
use gloss_core::record::{Flashcard, Highlight, HighlightId};
use url::Url;

const UNKNOWN_SITE: &str = "unknown-site";

/// Render every flashcard as markdown, grouped by page in first-seen order.
/// A card whose highlight is present in `highlights` gets a quoted context
/// line.
pub fn render_markdown(flashcards: &[Flashcard], highlights: &[Highlight]) -> String {
  let texts: HashMap<HighlightId, &str> =
    highlights.iter().map(|h| (h.id, h.text.as_str())).collect();

  let mut pages: Vec<(&str, Vec<&Flashcard>)> = Vec::new();
  for card in flashcards {
    match pages.iter_mut().find(|(url, _)| *url == card.page_url) {
      Some((_, cards)) => cards.push(card),
      None => pages.push((card.page_url.as_str(), vec![card])),
    }
  }

  let mut out = String::from("# Flashcards\n\n");
  for (url, cards) in pages {
    let _ = write!(out, "## Page: {url}\n\n");
    for card in cards {
      out.push_str("### Card\n\n");
      let _ = write!(out, "**Question:** {}\n\n", card.question);
      let _ = write!(out, "**Answer:** {}\n\n", card.answer);
      if let Some(text) = card.highlight_id.and_then(|id| texts.get(&id)) {
        let _ = write!(out, "**Context:** \"{text}\"\n\n");
      }
      let _ = write!(out, "**Source:** [Link]({url})\n\n");
      out.push_str("---\n\n");
    }
  }
  out
}

/// `flashcards-<host>[-<host>]-<date>.md`, naming at most the first two
/// distinct sites the cards come from.
pub fn export_filename(flashcards: &[Flashcard], date: NaiveDate) -> String {
  let mut sites: Vec<String> = Vec::new();
  for card in flashcards {
    let site = match hostname(&card.page_url) {
      Some(h) if h.starts_with("www.") => h[4..].to_owned(),
      Some(h) => h,
      None => UNKNOWN_SITE.to_owned(),
    };
    if !sites.contains(&site) {
      sites.push(site);
    }
  }
  let sites = sites.into_iter().take(2).collect::<Vec<_>>().join("-");
  format!("flashcards-{sites}-{}.md", date.format("%Y-%m-%d"))
}

/// The host of an absolute URL, normalised the way browsers normalise it:
/// lowercased, percent-decoded and punycode-encoded.
fn hostname(url: &str) -> Option<String> {
  Url::parse(url).ok()?.host_str().map(str::to_owned)
}
