//! SQLite storage layer.
//!
//! The message log backed by SQLite with WAL mode and split read/write
//! connection pools.

pub mod message_log;
pub mod pool;

pub use message_log::SqliteMessageLog;
pub use pool::DatabasePool;
