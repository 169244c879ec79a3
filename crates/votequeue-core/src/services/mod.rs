//! Service layer shared by all votequeue clients.

mod queue;

pub use queue::QueueService;
