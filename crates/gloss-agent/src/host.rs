//! The host: the broker between detached surfaces and the active document
//! context, plus the document context's own request loop.

use std::{
  future::Future,
  path::{Path, PathBuf},
  sync::{Arc, PoisonError, RwLock},
  time::Duration,
};

use chrono::Utc;
use gloss_core::store::AnnotationStore;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  export::{export_filename, render_markdown},
  protocol::{Envelope, HostClient, Request, Response},
};

pub const NO_DOCUMENT_CONTEXT: &str = "No active document context";

/// How long a forwarded request may wait on the document context unless
/// [`HostBroker::with_forward_timeout`] says otherwise.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Export sink ─────────────────────────────────────────────────────────────

/// Where exported markdown documents end up.
pub trait ExportSink: Send + Sync {
  /// Persist `contents` under `filename` and return where it went.
  fn save<'a>(
    &'a self,
    filename: &'a str,
    contents: &'a str,
  ) -> impl Future<Output = Result<PathBuf>> + Send + 'a;
}

/// Writes exports as files in one directory, creating it when missing.
#[derive(Debug, Clone)]
pub struct DirectorySink {
  dir: PathBuf,
}

impl DirectorySink {
  pub fn new(dir: impl AsRef<Path>) -> Self { Self { dir: dir.as_ref().to_path_buf() } }
}

impl ExportSink for DirectorySink {
  async fn save(&self, filename: &str, contents: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(&self.dir).await?;
    let path = self.dir.join(filename);
    tokio::fs::write(&path, contents).await?;
    Ok(path)
  }
}

// ─── Broker ──────────────────────────────────────────────────────────────────

/// Routes surface requests to whichever document context is attached.
///
/// Cheap to clone; clones share the attachment.
#[derive(Debug)]
pub struct HostBroker<X> {
  active:  Arc<RwLock<Option<HostClient>>>,
  sink:    Arc<X>,
  timeout: Duration,
}

impl<X> Clone for HostBroker<X> {
  fn clone(&self) -> Self {
    Self {
      active:  Arc::clone(&self.active),
      sink:    Arc::clone(&self.sink),
      timeout: self.timeout,
    }
  }
}

impl<X: ExportSink + 'static> HostBroker<X> {
  pub fn new(sink: X) -> Self {
    Self {
      active:  Arc::new(RwLock::new(None)),
      sink:    Arc::new(sink),
      timeout: DEFAULT_FORWARD_TIMEOUT,
    }
  }

  /// Give up on a forwarded request after `timeout`, answering with an
  /// error instead.
  pub fn with_forward_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Make `context` the active document context, replacing any other.
  pub fn attach(&self, context: HostClient) {
    *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(context);
    debug!("document context attached");
  }

  pub fn detach(&self) {
    *self.active.write().unwrap_or_else(PoisonError::into_inner) = None;
    debug!("document context detached");
  }

  fn active(&self) -> Option<HostClient> {
    self
      .active
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
      .filter(|c| !c.is_closed())
  }

  /// Answer a single request. Always produces exactly one response.
  pub async fn handle(&self, request: Request) -> Response {
    match request {
      Request::GetDatabaseContents => self.forward(request).await,
      Request::ExportToMarkdown => self.export().await,
    }
  }

  /// Serve surface requests until every surface client is dropped. Each
  /// request is answered on its own task so a slow document context never
  /// holds up the others.
  pub async fn run(self, mut inbox: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = inbox.recv().await {
      let broker = self.clone();
      tokio::spawn(async move {
        debug!(id = %envelope.id, action = %envelope.request, "host received request");
        let response = broker.handle(envelope.request).await;
        envelope.respond(response);
      });
    }
    debug!("host inbox closed");
  }

  async fn forward(&self, request: Request) -> Response {
    let Some(context) = self.active() else {
      return Response::error(NO_DOCUMENT_CONTEXT);
    };
    match tokio::time::timeout(self.timeout, context.send(request)).await {
      Ok(Ok(response)) => response,
      Ok(Err(e)) => Response::error(e.to_string()),
      Err(_) => {
        warn!(timeout = ?self.timeout, %request, "document context did not answer");
        Response::error(Error::SyncTimeout(self.timeout).to_string())
      }
    }
  }

  async fn export(&self) -> Response {
    let snapshot = match self.forward(Request::GetDatabaseContents).await {
      Response::Contents(snapshot) => snapshot,
      Response::Error { error } => return Response::Error { error },
      other => return Response::error(format!("unexpected response: {other:?}")),
    };

    let filename = export_filename(&snapshot.flashcards, Utc::now().date_naive());
    let markdown = render_markdown(&snapshot.flashcards, &snapshot.highlights);
    match self.sink.save(&filename, &markdown).await {
      Ok(path) => {
        info!(path = %path.display(), cards = snapshot.flashcards.len(), "exported flashcards");
        Response::Exported { success: true }
      }
      Err(e) => {
        warn!(error = %e, "export failed");
        Response::error(e.to_string())
      }
    }
  }
}

// ─── Document context ────────────────────────────────────────────────────────

/// Answer requests addressed to the document context from its own store,
/// until the inbox closes.
pub async fn serve_document_context<S: AnnotationStore>(
  store: Arc<S>,
  mut inbox: mpsc::Receiver<Envelope>,
) {
  while let Some(envelope) = inbox.recv().await {
    let response = match envelope.request {
      Request::GetDatabaseContents => match store.export_snapshot().await {
        Ok(snapshot) => Response::Contents(snapshot),
        Err(e) => {
          warn!(error = %e, "snapshot export failed");
          Response::error(e.to_string())
        }
      },
      other => Response::error(format!("unsupported action: {other}")),
    };
    envelope.respond(response);
  }
  debug!("document context inbox closed");
}

#[cfg(test)]
pub(crate) mod testing {
  use std::{path::PathBuf, sync::Mutex};

  use super::ExportSink;
  use crate::Result;

  /// Keeps exports in memory.
  #[derive(Debug, Default)]
  pub struct MemorySink {
    pub saved: Mutex<Vec<(String, String)>>,
  }

  impl ExportSink for MemorySink {
    async fn save(&self, filename: &str, contents: &str) -> Result<PathBuf> {
      self
        .saved
        .lock()
        .unwrap()
        .push((filename.to_owned(), contents.to_owned()));
      Ok(PathBuf::from(filename))
    }
  }
}

#[cfg(test)]
mod tests {
  use gloss_core::record::NewFlashcard;
  use gloss_store_sqlite::SqliteStore;

  use super::{testing::MemorySink, *};
  use crate::protocol::channel;

  async fn document_store() -> SqliteStore {
    let s = SqliteStore::open_in_memory().await.unwrap();
    s.put_flashcard(NewFlashcard {
      highlight_id: None,
      page_url:     "https://www.bio.example/cell".into(),
      question:     "Q".into(),
      answer:       "A".into(),
    })
    .await
    .unwrap();
    s
  }

  fn attach_store(broker: &HostBroker<MemorySink>, store: SqliteStore) {
    let (client, inbox) = channel(4);
    tokio::spawn(serve_document_context(Arc::new(store), inbox));
    broker.attach(client);
  }

  #[tokio::test]
  async fn forwards_to_attached_context() {
    let broker = HostBroker::new(MemorySink::default());
    attach_store(&broker, document_store().await);

    let Response::Contents(snapshot) = broker.handle(Request::GetDatabaseContents).await else {
      panic!("expected contents");
    };
    assert_eq!(snapshot.flashcards.len(), 1);
  }

  #[tokio::test]
  async fn detached_host_answers_with_error() {
    let broker = HostBroker::new(MemorySink::default());
    attach_store(&broker, document_store().await);
    broker.detach();

    assert_eq!(
      broker.handle(Request::ExportToMarkdown).await,
      Response::error(NO_DOCUMENT_CONTEXT)
    );
    assert!(broker.sink.saved.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn export_writes_markdown_through_sink() {
    let broker = HostBroker::new(MemorySink::default());
    attach_store(&broker, document_store().await);

    assert_eq!(
      broker.handle(Request::ExportToMarkdown).await,
      Response::Exported { success: true }
    );
    let saved = broker.sink.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    let (filename, markdown) = &saved[0];
    assert!(filename.starts_with("flashcards-bio.example-"));
    assert!(filename.ends_with(".md"));
    assert!(markdown.starts_with("# Flashcards\n\n## Page: https://www.bio.example/cell"));
  }

  #[tokio::test]
  async fn silent_context_is_abandoned_after_timeout() {
    let broker =
      HostBroker::new(MemorySink::default()).with_forward_timeout(Duration::from_millis(50));
    // Attached, but nothing ever reads the inbox.
    let (client, _silent) = channel(4);
    broker.attach(client);

    let response = broker.handle(Request::GetDatabaseContents).await;
    assert_eq!(response, Response::error("sync timed out after 50ms"));
  }

  #[test]
  fn attach_survives_a_poisoned_lock() {
    let broker = HostBroker::new(MemorySink::default());
    let active = Arc::clone(&broker.active);
    let _ = std::thread::spawn(move || {
      let _guard = active.write().unwrap();
      panic!("poison the lock");
    })
    .join();
    assert!(broker.active.is_poisoned());

    let (client, _inbox) = channel(4);
    broker.attach(client);
    assert!(broker.active().is_some());
    broker.detach();
    assert!(broker.active().is_none());
  }

  #[tokio::test]
  async fn document_context_rejects_export_requests() {
    let (client, inbox) = channel(4);
    tokio::spawn(serve_document_context(Arc::new(document_store().await), inbox));
    let response = client.send(Request::ExportToMarkdown).await.unwrap();
    assert_eq!(response, Response::error("unsupported action: exportToMarkdown"));
  }

  #[tokio::test]
  async fn directory_sink_writes_file() {
    let dir = std::env::temp_dir().join(format!("gloss-export-{}", uuid::Uuid::new_v4()));
    let sink = DirectorySink::new(&dir);
    let path = sink.save("cards.md", "# Flashcards\n\n").await.unwrap();
    assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "# Flashcards\n\n");
    tokio::fs::remove_dir_all(&dir).await.unwrap();
  }
}
