//! Data models for votequeue

mod intent;
mod receipt;
mod selection;
mod sync_status;

pub use intent::{
    IntentId, IntentStatus, NewVoteIntent, QueuedVoteIntent, VoteBallot, VoterKey,
};
pub use receipt::{ReceiptOutcome, SyncReceipt};
pub use selection::{ballot_problem, is_encodable_selection, NONE_OF_THE_ABOVE};
pub use sync_status::{SyncReport, SyncStatusSnapshot};
