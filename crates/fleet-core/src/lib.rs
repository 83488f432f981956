//! Core types and trait definitions for the fleet location pipeline.
//!
//! This crate is deliberately free of database, cache and transport
//! dependencies. Every other crate depends on it; backends implement its
//! collaborator traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod cache;
pub mod error;
pub mod event;
pub mod location;
pub mod poi;
pub mod publish;
pub mod store;
pub mod vehicle;

pub use error::{Error, Result};
