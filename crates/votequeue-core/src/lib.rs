//! votequeue-core - Core library for votequeue
//!
//! Durable client-side queue for vote intents that could not be submitted to
//! the ledger right away, plus the sync engine that replays them exactly once
//! when connectivity returns and the monitor that decides when to do so.

pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{
    IntentId, IntentStatus, NewVoteIntent, QueuedVoteIntent, SyncReport, SyncStatusSnapshot,
    VoterKey,
};
pub use services::QueueService;
pub use sync::{CastOutcome, SyncEngine, SyncMonitor, SyncOptions};
