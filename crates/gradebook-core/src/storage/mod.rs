//! # Storage Module
//!
//! Persistent storage backends for the gradebook.
//!
//! - `RedbStore`: ACID-compliant storage using the redb embedded database

mod redb_store;

pub use redb_store::RedbStore;
