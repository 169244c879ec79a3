//! Database layer for votequeue

mod connection;
mod migrations;
mod queue_repository;
mod state_repository;

pub use connection::Database;
pub use queue_repository::{LibSqlQueueRepository, QueueRepository};
pub use state_repository::{LibSqlSyncStateRepository, SyncStateRepository};
