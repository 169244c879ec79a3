use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use votequeue_core::IntentStatus;

#[derive(Parser)]
#[command(name = "votequeue")]
#[command(about = "Queue votes while offline and replay them to the ledger")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local queue database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name holding ledger and sync settings
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Treat the device as offline, skipping the connectivity check
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cast a vote, queueing it if the ledger cannot be reached
    Cast {
        #[command(flatten)]
        ballot: BallotArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Queue a vote without trying the ledger
    Enqueue {
        #[command(flatten)]
        ballot: BallotArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List queued votes
    #[command(alias = "ls")]
    List {
        /// Only show votes in this status
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one queued vote
    Show {
        /// Queued vote ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show queue and last sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay queued votes to the ledger now
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep running, syncing whenever the ledger becomes reachable
    Watch,
    /// Remove votes left behind in `synced`
    Purge,
    /// Drop a queued vote without submitting it
    Discard {
        /// Queued vote ID or unique ID prefix
        id: String,
    },
    /// List recent sync receipts
    Receipts {
        /// Number of receipts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the signer token used to authorize submissions
    Signer {
        #[command(subcommand)]
        command: SignerCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct BallotArgs {
    /// Voter registration number
    #[arg(long, value_name = "KEY")]
    pub voter: String,
    /// Candidate id (uint or UUID, or NOTA)
    #[arg(long, value_name = "ID")]
    pub candidate: String,
    /// Ward id (uint or UUID)
    #[arg(long, value_name = "ID")]
    pub ward: String,
    /// Human-readable candidate label shown in listings
    #[arg(long, value_name = "TEXT")]
    pub label: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusFilter {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl From<StatusFilter> for IntentStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Pending => Self::Pending,
            StatusFilter::Syncing => Self::Syncing,
            StatusFilter::Synced => Self::Synced,
            StatusFilter::Failed => Self::Failed,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Ledger gateway base URL
        #[arg(long, value_name = "URL")]
        ledger_url: Option<String>,
        /// Connectivity probe URL (defaults to <ledger-url>/health)
        #[arg(long, value_name = "URL")]
        health_url: Option<String>,
        /// Syncing attempts before a vote is marked failed
        #[arg(long, value_name = "N")]
        max_attempts: Option<u32>,
        /// Pause between submissions in milliseconds
        #[arg(long, value_name = "MS")]
        inter_item_delay_ms: Option<u64>,
        /// Wait after reconnecting before syncing, in milliseconds
        #[arg(long, value_name = "MS")]
        settle_delay_ms: Option<u64>,
        /// Connectivity and status poll interval in milliseconds
        #[arg(long, value_name = "MS")]
        poll_interval_ms: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Show the resolved profile
    Show {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum SignerCommands {
    /// Store the signer token in the keychain (reads stdin when omitted)
    Set {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Signer token
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
    },
    /// Show whether a signer token is available
    Status {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
    /// Remove the stored signer token
    Clear {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
