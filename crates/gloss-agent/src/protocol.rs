//! Messages exchanged between the detached surface, the host and the
//! document context.
//!
//! Requests are tagged by `action` on the wire. Every request gets exactly
//! one [`Response`] through the `oneshot` carried in its [`Envelope`].

use gloss_core::record::Snapshot;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(tag = "action", rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Request {
  /// Fetch a full [`Snapshot`] of the document context's store.
  GetDatabaseContents,
  /// Render the document context's flashcards as markdown and save them.
  ExportToMarkdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
  Contents(Snapshot),
  Exported { success: bool },
  Error { error: String },
}

impl Response {
  pub fn error(message: impl Into<String>) -> Self { Self::Error { error: message.into() } }
}

/// A request in flight, with the channel its single response goes back on.
#[derive(Debug)]
pub struct Envelope {
  pub id:      Uuid,
  pub request: Request,
  pub reply:   oneshot::Sender<Response>,
}

impl Envelope {
  /// Answer the request. A requester that stopped waiting is not an error.
  pub fn respond(self, response: Response) {
    if self.reply.send(response).is_err() {
      debug!(id = %self.id, "requester went away before the response");
    }
  }
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// The sending half of a context's inbox.
///
/// Cheap to clone; each clone shares the same inbox.
#[derive(Debug, Clone)]
pub struct HostClient {
  tx: mpsc::Sender<Envelope>,
}

/// Create a connected client and inbox.
pub fn channel(capacity: usize) -> (HostClient, mpsc::Receiver<Envelope>) {
  let (tx, rx) = mpsc::channel(capacity);
  (HostClient { tx }, rx)
}

impl HostClient {
  /// Send `request` and wait for its response. No timeout is applied here;
  /// callers wrap this in [`tokio::time::timeout`] when they need one.
  pub async fn send(&self, request: Request) -> Result<Response> {
    let id = Uuid::new_v4();
    let (reply, response) = oneshot::channel();
    debug!(%id, action = %request, "sending request");

    self
      .tx
      .send(Envelope { id, request, reply })
      .await
      .map_err(|_| Error::SyncUnavailable("receiving context is closed".into()))?;

    response
      .await
      .map_err(|_| Error::SyncUnavailable("request dropped without a response".into()))
  }

  pub fn is_closed(&self) -> bool { self.tx.is_closed() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn requests_are_tagged_by_action() {
    let json = serde_json::to_value(Request::GetDatabaseContents).unwrap();
    assert_eq!(json, serde_json::json!({ "action": "getDatabaseContents" }));

    let parsed: Request =
      serde_json::from_str(r#"{ "action": "exportToMarkdown" }"#).unwrap();
    assert_eq!(parsed, Request::ExportToMarkdown);

    assert_eq!(Request::ExportToMarkdown.to_string(), "exportToMarkdown");
    assert_eq!(
      "getDatabaseContents".parse::<Request>().unwrap(),
      Request::GetDatabaseContents
    );
  }

  #[test]
  fn responses_keep_their_wire_shape() {
    let contents: Response =
      serde_json::from_str(r#"{ "flashcards": [], "highlights": [] }"#).unwrap();
    assert_eq!(contents, Response::Contents(Snapshot::default()));

    let failed: Response = serde_json::from_str(r#"{ "error": "No active document context" }"#).unwrap();
    assert_eq!(failed, Response::error("No active document context"));

    let done = serde_json::to_value(Response::Exported { success: true }).unwrap();
    assert_eq!(done, serde_json::json!({ "success": true }));
  }

  #[tokio::test]
  async fn closed_inbox_is_unavailable() {
    let (client, inbox) = channel(1);
    drop(inbox);
    let err = client.send(Request::GetDatabaseContents).await.unwrap_err();
    assert!(matches!(err, Error::SyncUnavailable(_)));
  }

  #[tokio::test]
  async fn dropped_envelope_is_unavailable() {
    let (client, mut inbox) = channel(1);
    tokio::spawn(async move {
      let envelope = inbox.recv().await.unwrap();
      drop(envelope);
    });
    let err = client.send(Request::GetDatabaseContents).await.unwrap_err();
    assert!(matches!(err, Error::SyncUnavailable(_)));
  }
}
