//! archive-sync-core - Reconciliation engine for archive-sync
//!
//! This crate holds the models, the persisted identity map and watermarks,
//! the remote tree and archive clients, and the engine that reconciles the
//! two. The `archive-sync` binary is a thin layer over it.

pub mod archive;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod remote;
#[cfg(test)]
mod testing;
mod util;

pub use error::{Error, ErrorKind, Result};
pub use models::{ArchiveDocument, RemoteItem, SyncRecord};
