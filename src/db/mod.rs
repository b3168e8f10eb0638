pub mod connection;
pub mod kv_store;
pub mod migrations;

pub use connection::initialize_database;
pub use kv_store::{KeyValueStore, SqliteKeyValueStore};
