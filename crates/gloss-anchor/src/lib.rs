//! Document tree and text anchoring for gloss.
//!
//! [`Document`] is a small arena tree parsed from markup with `quick-xml`.
//! [`AnchorResolver`] finds previously highlighted text in it and wraps that
//! text in marker elements, surviving a serialize → parse reload.

mod document;
pub mod error;
mod parse;
pub mod range;
pub mod resolver;
mod serialize;

pub use document::{Document, NodeData, NodeId, RAW_TEXT_ELEMENTS, VOID_ELEMENTS};
pub use error::{Error, Result};
pub use range::{Boundary, Range, SurroundRejection};
pub use resolver::{
  AnchorResolver, MarkerHandle, MarkerStyle, Placement, Selection, WrapStrategy,
};
