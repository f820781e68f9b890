//! Track one dataset against a running analysis service
//!
//! Start one with `dataprobe mock-server`, then
//! `cargo run --example basic_usage -- /data/bank.csv`.

use dataprobe_core::{load_config, DataProbe, DatasetDescriptor, ProbeEvent};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dataprobe_core::logger::init_logging(false);

    let file = env::args().nth(1).unwrap_or_else(|| "sample_customers.csv".to_string());
    let config = load_config(None)?;
    let probe = DataProbe::connect(config)?;

    let mut session = probe.track(DatasetDescriptor::upload(file));
    while let Some(event) = session.events.recv().await {
        match event {
            ProbeEvent::Progress(status) => {
                println!("{} of 3 steps done", status.succeeded_steps());
            }
            ProbeEvent::Preview(table) => {
                println!("Preview: {} columns, {} rows", table.columns.len(), table.rows.len());
            }
            ProbeEvent::Profile(report) => {
                for column in &report.columns {
                    println!("  {} ({:?})", column.name, column.inferred_type);
                }
            }
            other => println!("{:?}", other),
        }
    }
    session.finish().await?;

    Ok(())
}
