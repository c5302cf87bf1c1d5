//! SQL Pilot - retrieval-augmented ghost-text SQL suggestions
//!
//! Captured text is embedded, matched against a store of example queries, folded into a prompt
//! together with optional schema and session history, and completed by a language model. The
//! result is shown as provisional ghost text that the user accepts or dismisses; every outcome
//! lands in an append-only CSV log.

pub mod cli;
pub mod completion;
pub mod config;
pub mod context;
pub mod embedding_client;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod retry;
pub mod schema;
pub mod suggestion_log;
pub mod vector_store;

pub use error::{PilotError, Result};
