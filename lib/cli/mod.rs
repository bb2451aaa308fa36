use crate::build_info;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    about = "Keeps DNSLink zone entries in sync with .bit ipfs/ipns records",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT
)]
pub struct Cli {
    #[clap(long)]
    /// Load environment variables from this file instead of `./.env`
    pub env_file: Option<PathBuf>,

    #[clap(long, conflicts_with = "backlog_only")]
    /// Skip the startup backlog pass and only follow new records
    pub no_backlog: bool,

    #[clap(long)]
    /// Run the backlog pass once and exit without watching
    pub backlog_only: bool,

    #[clap(long)]
    /// Override N_WORKERS
    pub workers: Option<usize>,
}

/// Which parts of the pipeline a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Backlog pass, then follow new records until shutdown.
    Live,
    /// Follow new records from the snapshot watermark without replaying it.
    LiveNoBacklog,
    /// Backlog pass only.
    BacklogOnly,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::LiveNoBacklog => "live_no_backlog",
            Self::BacklogOnly => "backlog_only",
        }
    }
}

impl Cli {
    pub fn run_mode(&self) -> RunMode {
        if self.backlog_only {
            RunMode::BacklogOnly
        } else if self.no_backlog {
            RunMode::LiveNoBacklog
        } else {
            RunMode::Live
        }
    }
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
