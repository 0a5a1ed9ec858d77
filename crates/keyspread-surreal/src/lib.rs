//! SurrealDB v2 implementation of the keyspread store contract.
//!
//! Rows live in one SurrealDB table per keyspread table, under record ids
//! built from the encoded storage key. Every write set runs as one
//! SurrealQL transaction, so the atomicity and uniqueness guarantees of
//! [`keyspread_store::StoreClient`] come from the database.
//!
//! Works against a `ws://` server or the embedded `mem://` engine.

mod config;
mod document;
mod statements;
mod store;

pub use config::SurrealConfig;
pub use store::Surreal2Store;
