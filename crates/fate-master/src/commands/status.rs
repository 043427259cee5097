use fate_operations::operations::MasterStep;
use fate_saga::{SagaStep, TxRecord};

use crate::config::MasterConfig;
use crate::error::Result;
use crate::master::Master;

pub(crate) fn run(config: &MasterConfig) -> Result<()> {
    let master = Master::open(config)?;
    let records = master.executor.transactions()?;
    if records.is_empty() {
        println!("No transactions.");
        return Ok(());
    }

    for record in &records {
        println!("{}", describe(record));
    }
    Ok(())
}

fn describe(record: &TxRecord<MasterStep>) -> String {
    let mut line = format!("{} {}", record.id, record.status);
    if let Some(step) = &record.current_step {
        line.push_str(&format!(" step={}", step.name()));
    }
    if let Some(result) = &record.result {
        line.push_str(&format!(" result={result}"));
    }
    if let Some(failure) = &record.failure {
        line.push_str(&format!(" failed-at={}: {}", failure.step, failure.message));
    }
    if let Some(failure) = &record.compensation_failure {
        line.push_str(&format!(
            " needs-operator: {} ({})",
            failure.description, failure.message
        ));
    }
    line
}
