//! Core types, the `NoteStore` trait, and the flow engine services for
//! emoflow.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! deep-session saga ([`session`]) and the flow read model ([`query`]) are
//! written against [`store::NoteStore`] only.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod flow;
pub mod id;
pub mod note;
pub mod owner;
pub mod query;
pub mod session;
pub mod store;

pub use error::{BoxError, Error, Result};
pub use owner::Owner;

#[cfg(test)]
mod testing;
