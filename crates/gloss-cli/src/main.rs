//! gloss command-line binary.
//!
//! Reads `gloss.toml` (or the path given with `--config`) plus `GLOSS_*`
//! environment variables, opens the document-context store, and runs one
//! session operation against a markup file standing in for the live page.

use std::{
  io::{self, BufRead, Write},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, anyhow, bail};
use clap::{Parser, Subcommand};
use gloss_agent::{
  AgentConfig, AnnotationManager, DirectorySink, HostBroker, Prompt, Request, Response,
  SessionView, SyncMediator, protocol::channel, serve_document_context,
};
use gloss_anchor::Document;
use gloss_core::{record::FlashcardId, store::AnnotationStore};
use gloss_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Anchored flashcards for documents")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "gloss.toml")]
  config: PathBuf,

  /// Answer yes to every confirmation.
  #[arg(short, long, global = true)]
  yes: bool,

  #[command(subcommand)]
  command: Command,
}

/// The page a session runs against.
#[derive(clap::Args)]
struct PageArgs {
  /// URL the page is stored under.
  #[arg(long)]
  url:  String,
  /// Markup file holding the page content.
  #[arg(long)]
  file: PathBuf,
}

#[derive(Subcommand)]
enum Command {
  /// Save a flashcard, anchored to the first occurrence of `--text` if given.
  Save {
    #[command(flatten)]
    page:     PageArgs,
    #[arg(long)]
    text:     Option<String>,
    #[arg(short, long)]
    question: String,
    #[arg(short, long)]
    answer:   String,
    /// Write the marked-up page here.
    #[arg(long)]
    out:      Option<PathBuf>,
  },
  /// Restore every stored highlight on a page and print the marked markup.
  Restore {
    #[command(flatten)]
    page: PageArgs,
  },
  /// Show the flashcard behind the highlight of `--text`.
  View {
    #[command(flatten)]
    page: PageArgs,
    #[arg(long)]
    text: String,
  },
  /// Delete the flashcard behind the highlight of `--text`, or a flashcard
  /// saved on the page without a highlight.
  Delete {
    #[command(flatten)]
    page:      PageArgs,
    #[arg(long, required_unless_present = "flashcard", conflicts_with = "flashcard")]
    text:      Option<String>,
    /// Id of a highlight-less flashcard, as printed by `list`.
    #[arg(long)]
    flashcard: Option<i64>,
  },
  /// List stored flashcards.
  List {
    /// Only cards saved against this URL.
    #[arg(long)]
    url:     Option<String>,
    /// Read the detached surface's replica instead of the document store.
    #[arg(long)]
    surface: bool,
  },
  /// Pull the document store's records into the surface replica.
  Sync,
  /// Export every flashcard as markdown into the configured directory.
  Export,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("GLOSS"))
    .build()
    .context("failed to read config file")?;
  let cfg: AgentConfig = settings
    .try_deserialize()
    .context("failed to deserialise AgentConfig")?;

  let prompt = TerminalPrompt { assume_yes: cli.yes };

  match cli.command {
    Command::Save { page, text, question, answer, out } => {
      let store = open_store(&cfg.document_store).await?;
      let mut manager = load_session(store, prompt, &page, &cfg).await?;
      if let Some(text) = text {
        let range = manager
          .resolver()
          .find(manager.document(), &text)
          .ok_or_else(|| anyhow!("{text:?} does not occur on the page"))?;
        if !manager.select(&range)? {
          bail!("selection is empty");
        }
      }
      let saved = manager.save(&question, &answer).await?;
      match saved.highlight_id {
        Some(id) => println!("saved flashcard {} on highlight {id}", saved.flashcard_id),
        None => println!("saved flashcard {}", saved.flashcard_id),
      }
      if let Some(out) = out {
        std::fs::write(&out, manager.document().to_markup()?)
          .with_context(|| format!("failed to write {out:?}"))?;
      }
    }

    Command::Restore { page } => {
      let store = open_store(&cfg.document_store).await?;
      let manager = load_session(store, prompt, &page, &cfg).await?;
      println!("{}", manager.document().to_markup()?);
    }

    Command::View { page, text } => {
      let store = open_store(&cfg.document_store).await?;
      let mut manager = load_session(store, prompt, &page, &cfg).await?;
      let marker = marker_for(&manager, &text)?;
      match manager.view(marker).await? {
        Some(card) => println!("Q: {}\nA: {}", card.question, card.answer),
        None => println!("no flashcard for {text:?}"),
      }
    }

    Command::Delete { page, text, flashcard } => {
      let store = open_store(&cfg.document_store).await?;
      let mut manager = load_session(store, prompt, &page, &cfg).await?;
      let deleted = match (text, flashcard) {
        (_, Some(id)) => manager.delete_card(FlashcardId(id)).await?,
        (Some(text), None) => {
          let marker = marker_for(&manager, &text)?;
          if manager.view(marker).await?.is_none() {
            bail!("no flashcard for {text:?}");
          }
          manager.delete().await?
        }
        (None, None) => bail!("either --text or --flashcard is required"),
      };
      if deleted {
        println!("deleted");
      }
    }

    Command::List { url, surface } => {
      let path = if surface { &cfg.surface_store } else { &cfg.document_store };
      let store = open_store(path).await?;
      let cards = match url {
        Some(url) => store.flashcards_for_page(&url).await?,
        None => store.export_snapshot().await?.flashcards,
      };
      for card in cards {
        println!("{}\t{}\t{}\t{}", card.id, card.page_url, card.question, card.answer);
      }
    }

    Command::Sync => {
      let document = open_store(&cfg.document_store).await?;
      let surface = open_store(&cfg.surface_store).await?;
      let (broker, host) = start_host(document, &cfg);
      let view = SyncMediator::new(host, cfg.sync_timeout())
        .start_session(&*surface)
        .await;
      broker.detach();
      match view {
        SessionView::Fresh(report) => println!(
          "synced {} highlights and {} flashcards",
          report.highlights, report.flashcards
        ),
        SessionView::Stale(e) => bail!("sync failed: {e}"),
      }
    }

    Command::Export => {
      let document = open_store(&cfg.document_store).await?;
      let (_broker, host) = start_host(document, &cfg);
      let response = tokio::time::timeout(cfg.sync_timeout(), host.send(Request::ExportToMarkdown))
        .await
        .context("export timed out")??;
      match response {
        Response::Exported { .. } => println!("exported to {:?}", cfg.export_dir),
        Response::Error { error } => {
          prompt.alert(gloss_agent::prompt::EXPORT_FAILED);
          bail!("export failed: {error}");
        }
        Response::Contents(_) => bail!("unexpected response to export"),
      }
    }
  }

  Ok(())
}

async fn open_store(path: &Path) -> anyhow::Result<Arc<SqliteStore>> {
  let path = expand_tilde(path);
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&path)
    .await
    .with_context(|| format!("failed to open store at {path:?}"))?;
  Ok(Arc::new(store))
}

/// Parse the page and put its stored highlights back, as a page load does.
async fn load_session(
  store: Arc<SqliteStore>,
  prompt: TerminalPrompt,
  page: &PageArgs,
  cfg: &AgentConfig,
) -> anyhow::Result<AnnotationManager<SqliteStore, TerminalPrompt>> {
  let markup = std::fs::read_to_string(&page.file)
    .with_context(|| format!("failed to read {:?}", page.file))?;
  let document = Document::parse(&markup)
    .with_context(|| format!("failed to parse {:?}", page.file))?;

  let mut manager = AnnotationManager::new(store, prompt, page.url.clone(), document, cfg);
  let report = manager.restore_all().await;
  if !report.missed.is_empty() {
    tracing::warn!(missed = report.missed.len(), "some highlights could not be restored");
  }
  Ok(manager)
}

fn marker_for(
  manager: &AnnotationManager<SqliteStore, TerminalPrompt>,
  text: &str,
) -> anyhow::Result<gloss_anchor::NodeId> {
  let doc = manager.document();
  manager
    .resolver()
    .markers(doc, manager.page_url())
    .into_iter()
    .find(|m| doc.text_content(m.node) == text)
    .map(|m| m.node)
    .ok_or_else(|| anyhow!("no highlight of {text:?} on the page"))
}

/// Serve the document store behind a host broker and return a surface-side
/// client connected to it.
fn start_host(
  document: Arc<SqliteStore>,
  cfg: &AgentConfig,
) -> (HostBroker<DirectorySink>, gloss_agent::HostClient) {
  let sink = DirectorySink::new(expand_tilde(&cfg.export_dir));
  let broker = HostBroker::new(sink).with_forward_timeout(cfg.sync_timeout());
  let (context, context_inbox) = channel(16);
  tokio::spawn(serve_document_context(document, context_inbox));
  broker.attach(context);

  let (host, host_inbox) = channel(16);
  tokio::spawn(broker.clone().run(host_inbox));
  (broker, host)
}

// ─── Prompt ──────────────────────────────────────────────────────────────────

struct TerminalPrompt {
  assume_yes: bool,
}

impl Prompt for TerminalPrompt {
  fn alert(&self, message: &str) { eprintln!("{message}"); }

  fn confirm(&self, message: &str) -> bool {
    if self.assume_yes {
      return true;
    }
    eprint!("{message} [y/N] ");
    io::stderr().flush().ok();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
      return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
