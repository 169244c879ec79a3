pub mod cast;
pub mod common;
pub mod completions;
pub mod config;
pub mod discard;
pub mod list;
pub mod purge;
pub mod receipts;
pub mod signer;
pub mod status;
pub mod sync;
pub mod watch;
