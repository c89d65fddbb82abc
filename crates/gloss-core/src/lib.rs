//! Core types and trait definitions for the gloss annotation store.
//!
//! This crate is deliberately free of database and document dependencies.
//! Every other crate depends on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod annotation;
pub mod error;
pub mod record;
pub mod store;

pub use error::{Error, Result};
