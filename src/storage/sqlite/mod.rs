//! Shared `SQLite` infrastructure.
//!
//! - [`connection`]: opening, pragma configuration and poison-tolerant locking
//! - [`schema`]: the `files` table and its indexes

mod connection;
mod schema;

pub use connection::{
    BUSY_TIMEOUT_MS, acquire_lock, configure_connection, open, open_in_memory,
};
pub use schema::{FILES_TABLE, initialize_schema};
