//! One-way pull of the document context's records into the detached
//! surface's replica store.

use std::time::Duration;

use gloss_core::store::AnnotationStore;
use tracing::{info, warn};

use crate::{
  Error, Result,
  protocol::{HostClient, Request, Response},
};

/// Counts of what one sync imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
  pub highlights: usize,
  pub flashcards: usize,
}

/// What a detached surface shows after its session-start sync.
#[derive(Debug)]
pub enum SessionView {
  /// The replica now mirrors the document context.
  Fresh(SyncReport),
  /// The sync failed; the replica holds whatever it held before.
  Stale(Error),
}

impl SessionView {
  pub fn is_stale(&self) -> bool { matches!(self, Self::Stale(_)) }
}

#[derive(Debug, Clone)]
pub struct SyncMediator {
  host:    HostClient,
  timeout: Duration,
}

impl SyncMediator {
  pub fn new(host: HostClient, timeout: Duration) -> Self { Self { host, timeout } }

  /// Request a snapshot through the host and import it into `replica`.
  ///
  /// A single attempt: no retry, no push back to the document context.
  pub async fn run<S: AnnotationStore>(&self, replica: &S) -> Result<SyncReport> {
    let response = tokio::time::timeout(self.timeout, self.host.send(Request::GetDatabaseContents))
      .await
      .map_err(|_| Error::SyncTimeout(self.timeout))??;

    let snapshot = match response {
      Response::Contents(snapshot) => snapshot,
      Response::Error { error } => return Err(Error::SyncUnavailable(error)),
      other => {
        return Err(Error::SyncUnavailable(format!("unexpected response: {other:?}")));
      }
    };

    let report = SyncReport {
      highlights: snapshot.highlights.len(),
      flashcards: snapshot.flashcards.len(),
    };
    replica.import_snapshot(snapshot).await.map_err(Error::store)?;
    info!(highlights = report.highlights, flashcards = report.flashcards, "sync complete");
    Ok(report)
  }

  /// [`run`](Self::run) for session start: a failure is logged and the
  /// surface carries on with its local data.
  pub async fn start_session<S: AnnotationStore>(&self, replica: &S) -> SessionView {
    match self.run(replica).await {
      Ok(report) => SessionView::Fresh(report),
      Err(e) => {
        warn!(error = %e, "sync failed, showing local data");
        SessionView::Stale(e)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use gloss_core::record::{NewFlashcard, NewHighlight};
  use gloss_store_sqlite::SqliteStore;

  use super::*;
  use crate::{
    host::{HostBroker, serve_document_context, testing::MemorySink},
    protocol::channel,
  };

  const PAGE: &str = "https://bio.example/cell";
  const WAIT: Duration = Duration::from_secs(5);

  async fn store() -> SqliteStore { SqliteStore::open_in_memory().await.unwrap() }

  async fn seeded() -> SqliteStore {
    let s = store().await;
    let h = s
      .put_highlight(NewHighlight::new(PAGE, "powerhouse of the cell"))
      .await
      .unwrap();
    s.put_flashcard(NewFlashcard {
      highlight_id: Some(h),
      page_url:     PAGE.into(),
      question:     "What is the powerhouse of the cell?".into(),
      answer:       "Mitochondria".into(),
    })
    .await
    .unwrap();
    s
  }

  /// Document context → host broker → surface client.
  fn wire(document: Option<SqliteStore>) -> (HostBroker<MemorySink>, HostClient) {
    let broker = HostBroker::new(MemorySink::default());
    if let Some(store) = document {
      let (client, inbox) = channel(8);
      tokio::spawn(serve_document_context(Arc::new(store), inbox));
      broker.attach(client);
    }
    let (surface, inbox) = channel(8);
    tokio::spawn(broker.clone().run(inbox));
    (broker, surface)
  }

  #[tokio::test]
  async fn sync_mirrors_document_context() {
    let document = seeded().await;
    let expected = document.export_snapshot().await.unwrap();
    let (_broker, surface) = wire(Some(document));

    let replica = store().await;
    let report = SyncMediator::new(surface, WAIT).run(&replica).await.unwrap();
    assert_eq!(report, SyncReport { highlights: 1, flashcards: 1 });
    assert_eq!(replica.export_snapshot().await.unwrap(), expected);
  }

  #[tokio::test]
  async fn repeated_sync_is_idempotent() {
    let (_broker, surface) = wire(Some(seeded().await));
    let replica = store().await;
    let mediator = SyncMediator::new(surface, WAIT);

    mediator.run(&replica).await.unwrap();
    let once = replica.export_snapshot().await.unwrap();
    mediator.run(&replica).await.unwrap();
    assert_eq!(replica.export_snapshot().await.unwrap(), once);
  }

  #[tokio::test]
  async fn no_document_context_is_unavailable() {
    let (_broker, surface) = wire(None);
    let replica = store().await;
    replica
      .put_flashcard(NewFlashcard {
        highlight_id: None,
        page_url:     PAGE.into(),
        question:     "local".into(),
        answer:       "only".into(),
      })
      .await
      .unwrap();
    let before = replica.export_snapshot().await.unwrap();

    let err = SyncMediator::new(surface, WAIT).run(&replica).await.unwrap_err();
    match err {
      Error::SyncUnavailable(message) => assert_eq!(message, "No active document context"),
      other => panic!("unexpected error: {other}"),
    }
    assert_eq!(replica.export_snapshot().await.unwrap(), before);
  }

  #[tokio::test]
  async fn silent_document_context_times_out() {
    let broker = HostBroker::new(MemorySink::default());
    // An attached context that never reads its inbox.
    let (client, _silent) = channel(8);
    broker.attach(client);
    let (surface, inbox) = channel(8);
    tokio::spawn(broker.clone().run(inbox));

    let replica = store().await;
    let mediator = SyncMediator::new(surface, Duration::from_millis(50));
    let err = mediator.run(&replica).await.unwrap_err();
    assert!(matches!(err, Error::SyncTimeout(_)));
    assert!(replica.export_snapshot().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn failed_session_start_reports_stale_view() {
    let (_broker, surface) = wire(None);
    let replica = store().await;
    let view = SyncMediator::new(surface, WAIT).start_session(&replica).await;
    assert!(view.is_stale());
  }
}
