//! Database-backed storage for the storelink server.

pub mod kv;

pub use kv::PgKeyValueStore;
