mod run;
mod status;

use std::time::Duration;

use clap::Subcommand;

use crate::config::MasterConfig;
use crate::error::Result;

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Resume every unfinished transaction and drive them until idle
    Run {
        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 3600)]
        timeout: u64,
    },
    /// List stored transactions
    Status,
}

impl Commands {
    pub(crate) fn execute(self, config: &MasterConfig) -> Result<()> {
        match self {
            Self::Run { timeout } => run::run(config, Duration::from_secs(timeout)),
            Self::Status => status::run(config),
        }
    }
}
