//! SQLite storage backend for Trellis
//!
//! Implements [`trellis_core::RowStore`]: one table per entity kind plus the
//! `entity_changes` feed, all written in a single SQLite transaction per mutation.
//!
//! ## Features
//!
//! - **Upserts in place**: a replaced row keeps its rowid, so keyset pages stay stable
//! - **WAL Mode**: concurrent readers while the note service writes
//! - **Versioned schema**: `schema_migrations` records applied versions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trellis_config::TrellisConfig;
//! use trellis_core::NoteService;
//! use trellis_sqlite::SqliteRowStore;
//!
//! let config = TrellisConfig::default();
//! let store = Arc::new(SqliteRowStore::open(&config.storage)?);
//! let service = NoteService::open(store, &config)?;
//! ```

pub mod connection;
pub mod error;
pub mod row_store;
pub mod schema;
mod tables;

pub use connection::SqlitePool;
pub use error::{SqliteError, SqliteResult};
pub use row_store::{SqliteRowStore, StorageStats};
