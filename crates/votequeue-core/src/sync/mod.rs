//! Queue replay: the sync engine, the monitor that triggers it, and the
//! connectivity signals both depend on.

mod connectivity;
mod engine;
mod monitor;
mod options;

pub use connectivity::{check_health, ConnectivityObserver, ConnectivitySignal, HealthProbe};
pub use engine::{CastOutcome, Subscription, SyncEngine};
pub use monitor::SyncMonitor;
pub use options::SyncOptions;
