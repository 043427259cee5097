use std::time::Duration;

use fate_saga::ExecutorPool;
use tracing::info;

use crate::config::MasterConfig;
use crate::error::{CliError, Result};
use crate::master::Master;

pub(crate) fn run(config: &MasterConfig, timeout: Duration) -> Result<()> {
    let master = Master::open(config)?;
    let recovered = master.executor.recoverable()?;
    if recovered.is_empty() {
        println!("No unfinished transactions.");
        return Ok(());
    }

    info!(count = recovered.len(), "driving recovered transactions");
    let pool = ExecutorPool::start(master.executor, master.cancel)?;
    let idle = pool.wait_idle(timeout);
    pool.shutdown();
    if !idle {
        let running = pool.executor().recoverable()?.len();
        return Err(CliError::NotIdle(running, timeout.as_secs()));
    }

    println!("Recovered transactions: {}", recovered.len());
    for tx in recovered {
        let outcome = pool.executor().outcome(tx)?;
        match (&outcome.result, &outcome.failure) {
            (Some(result), _) => println!("  {tx} {} ({result})", outcome.status),
            (None, Some(failure)) => {
                println!("  {tx} {} at {}: {}", outcome.status, failure.step, failure.message);
            }
            (None, None) => println!("  {tx} {}", outcome.status),
        }
    }
    Ok(())
}
