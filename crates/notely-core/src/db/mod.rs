//! Database layer for Notely

mod connection;
mod local_store;
mod memory;
pub mod migrations;

pub use connection::Database;
pub use local_store::{LibSqlLocalStore, LocalStore};
pub use memory::MemoryLocalStore;
pub use migrations::Migration;
