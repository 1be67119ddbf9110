use std::path::PathBuf;

use anyhow::{Context, Result};
use bus_corridor::simulation::{CorridorConfig, SimCorridor};
use clap::Parser;
use log::info;

#[derive(Parser)]
#[command(name = "bus_corridor")]
#[command(about = "Bus corridor simulation with berth queuing at stops")]
struct Cli {
    /// Scenario JSON file; the built-in demo corridor is used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks per replication
    #[arg(long, default_value = "3600")]
    ticks: u64,

    /// Seed of the first replication (later ones use seed + n)
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Number of independent replications
    #[arg(long, default_value = "1")]
    replications: u32,

    /// Override the scenario's cap on waiting passengers
    #[arg(long)]
    demand_bound: Option<f64>,

    /// Write per-tick bus positions and queue levels of the last replication as JSON
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print the corridor state after the last replication
    #[arg(long)]
    summary: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CorridorConfig::from_json_file(path)?,
        None => CorridorConfig::demo(),
    };
    if cli.demand_bound.is_some() {
        config.demand_bound = cli.demand_bound;
    }

    info!(
        "Running {} replication(s) of {} ticks over {} stops",
        cli.replications,
        cli.ticks,
        config.stops.len()
    );

    let mut corridor = SimCorridor::new(config, cli.seed).context("Failed to build corridor")?;
    if cli.snapshot.is_some() {
        corridor.enable_snapshots();
    }

    let results = corridor.run_replications(cli.ticks, cli.replications, cli.seed)?;

    info!("=== SIMULATION COMPLETE ===");
    let count = results.len().max(1) as f64;
    let stop_count = results.first().map_or(0, |r| r.stops.len());
    for index in 0..stop_count {
        let entry: f64 = results.iter().map(|r| r.stops[index].mean_entry_delay).sum::<f64>() / count;
        let exit: f64 = results.iter().map(|r| r.stops[index].mean_exit_delay).sum::<f64>() / count;
        let service: f64 = results.iter().map(|r| r.stops[index].mean_service_time).sum::<f64>() / count;
        info!(
            "Stop {}: entry delay={:.2}, exit delay={:.2}, service time={:.2}",
            index, entry, exit, service
        );
    }
    let finished: usize = results.iter().map(|r| r.finished).sum();
    let dispatched: usize = results.iter().map(|r| r.dispatched).sum();
    info!("Buses dispatched: {}", dispatched);
    info!("Buses finished: {}", finished);

    if cli.summary {
        corridor.print_summary();
    }

    if let (Some(path), Some(log)) = (&cli.snapshot, corridor.snapshots()) {
        log.write_to(path)?;
        info!("Snapshot written to {}", path.display());
    }

    Ok(())
}
