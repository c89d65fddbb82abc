//! The session layer of gloss.
//!
//! - [`manager`] drives one document session: selection, save, restore,
//!   view and delete.
//! - [`mediator`] pulls the document context's records into a detached
//!   surface's replica store.
//! - [`protocol`] and [`host`] carry requests between the two contexts.
//! - [`export`] renders flashcards as a markdown document.

pub mod config;
pub mod error;
pub mod export;
pub mod host;
pub mod manager;
pub mod mediator;
pub mod prompt;
pub mod protocol;

pub use config::AgentConfig;
pub use error::{Error, Result};
pub use host::{DirectorySink, ExportSink, HostBroker, serve_document_context};
pub use manager::{AnnotationManager, CardView, RestoreReport, SavedCard, SessionState};
pub use mediator::{SessionView, SyncMediator, SyncReport};
pub use prompt::Prompt;
pub use protocol::{HostClient, Request, Response};
