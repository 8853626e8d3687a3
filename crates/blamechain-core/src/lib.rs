//! Core types, hashing, and the ledger engine for Blamechain.
//!
//! Blamechain records every edit made to a mutable text record as an
//! immutable, hash-chained revision, so that any party can later prove the
//! recorded history was not altered.
//!
//! This crate is deliberately free of HTTP and database dependencies. Storage
//! backends implement [`store::LedgerStore`]; the [`ledger::Ledger`] engine
//! drives them.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod evidence;
pub mod hashing;
pub mod ledger;
pub mod revision;
pub mod source;
pub mod store;
pub mod verify;

mod locks;

pub use error::{Error, Result};
