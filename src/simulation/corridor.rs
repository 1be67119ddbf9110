//! The corridor driver that ties stops, links and buses together
//!
//! This is the entry point for running a bus corridor simulation. It owns
//! the fleet, the links and every stop, and runs them in a fixed order each
//! tick.

use anyhow::{Context, Result};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::bus::{BusFleet, StopRecord};
use super::config::CorridorConfig;
use super::link::{BusSink, LinkTable};
use super::snapshot::SnapshotLog;
use super::stop::SimStop;
use super::types::{BusId, LineId, LinkId, SimId, StopId};

/// Delay statistics of one stop, averaged over peak buses that visited it
#[derive(Debug, Clone, PartialEq)]
pub struct StopStats {
    pub stop: StopId,
    pub buses: usize,
    pub mean_entry_delay: f64,
    pub mean_exit_delay: f64,
    pub mean_service_time: f64,
}

/// Summary of one replication
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorridorStats {
    pub dispatched: usize,
    pub finished: usize,
    pub stops: Vec<StopStats>,
}

impl CorridorStats {
    /// Mean total delay (entry + exit) per stop visit, across all stops
    pub fn mean_delay(&self) -> f64 {
        let visits: usize = self.stops.iter().map(|s| s.buses).sum();
        if visits == 0 {
            return 0.0;
        }
        let total: f64 = self
            .stops
            .iter()
            .map(|s| (s.mean_entry_delay + s.mean_exit_delay) * s.buses as f64)
            .sum();
        total / visits as f64
    }
}

/// A chain of stops joined by links, with buses dispatched from a depot
pub struct SimCorridor {
    pub config: CorridorConfig,
    pub stops: Vec<SimStop>,
    pub links: LinkTable,
    pub fleet: BusFleet,
    /// Link from the depot into the first stop
    first_link: LinkId,
    /// Simulation time in ticks
    pub time: u64,
    rng: StdRng,
    snapshots: Option<SnapshotLog>,
}

impl SimCorridor {
    /// Build the corridor described by `config`, seeding its RNG with `seed`
    pub fn new(config: CorridorConfig, seed: u64) -> Result<Self> {
        if config.stops.is_empty() {
            anyhow::bail!("Corridor needs at least one stop");
        }

        let mut links = LinkTable::new();
        let mut stops = Vec::with_capacity(config.stops.len());
        for (index, stop_config) in config.stops.iter().enumerate() {
            let id = StopId(SimId(index));
            links.add_link(id, stop_config.link_travel_ticks);
            let mut stop = SimStop::from_config(id, stop_config)
                .with_context(|| format!("Invalid configuration for stop {index}"))?;
            if let Some(bound) = config.demand_bound {
                stop.pax_demand_bounding(bound);
            }
            stops.push(stop);
        }

        // stop i feeds link i + 1; the last stop is terminal
        let stop_count = stops.len();
        for (index, stop) in stops.iter_mut().enumerate() {
            let next = (index + 1 < stop_count).then(|| LinkId(SimId(index + 1)));
            stop.set_next_link(next);
        }

        Ok(Self {
            config,
            stops,
            links,
            fleet: BusFleet::new(),
            first_link: LinkId(SimId(0)),
            time: 0,
            rng: StdRng::seed_from_u64(seed),
            snapshots: None,
        })
    }

    /// Start recording per-tick snapshots
    pub fn enable_snapshots(&mut self) {
        self.snapshots = Some(SnapshotLog::new());
    }

    pub fn snapshots(&self) -> Option<&SnapshotLog> {
        self.snapshots.as_ref()
    }

    /// Clear all dynamic state for a new replication with a fresh seed
    pub fn reset(&mut self, seed: u64) {
        self.time = 0;
        self.fleet.clear();
        self.links.reset();
        for stop in &mut self.stops {
            stop.reset();
        }
        self.rng = StdRng::seed_from_u64(seed);
        if self.snapshots.is_some() {
            self.snapshots = Some(SnapshotLog::new());
        }
    }

    fn dispatch(&mut self) -> Result<()> {
        let is_peak = self.config.is_peak(self.time);
        for service in &self.config.services {
            if !service.dispatches_at(self.time) {
                continue;
            }
            let bus = self
                .fleet
                .spawn(LineId(service.line), service.bus_params(), self.time, is_peak);
            self.links.receive_bus(self.first_link, bus)?;
        }
        Ok(())
    }

    /// Advance the whole corridor by one tick
    pub fn tick(&mut self) -> Result<()> {
        self.links.set_now(self.time);
        self.dispatch()?;

        for (stop_id, bus) in self.links.release_all() {
            let stop = self
                .stops
                .get_mut(stop_id.0 .0)
                .context("Link leads to a missing stop")?;
            stop.bus_arrival(bus, &mut self.fleet, &mut self.links)?;
        }

        for stop in &mut self.stops {
            stop.pax_arrival(&mut self.rng);
            stop.operation(&mut self.fleet, &mut self.links, &mut self.rng)?;
            stop.update_bus_stats(&mut self.fleet)?;
        }

        if let Some(log) = &mut self.snapshots {
            for stop in &self.stops {
                log.record_stop(&stop.snapshot(&self.fleet, self.time)?);
            }
            for link in self.links.iter() {
                let buses = link
                    .buses()
                    .map(|bus| Ok((bus, self.fleet.get(bus)?.line)))
                    .collect::<Result<Vec<(BusId, LineId)>>>()?;
                log.record_link(link.id, self.time, &buses);
            }
        }

        self.time += 1;
        Ok(())
    }

    pub fn run(&mut self, ticks: u64) -> Result<()> {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(())
    }

    /// Run `replications` independent replications and collect their stats
    pub fn run_replications(&mut self, ticks: u64, replications: u32, seed: u64) -> Result<Vec<CorridorStats>> {
        let mut results = Vec::with_capacity(replications as usize);
        for replication in 0..replications {
            self.reset(seed.wrapping_add(replication as u64));
            self.run(ticks)?;
            let stats = self.stats();
            info!(
                "Replication {}: dispatched={}, finished={}, mean delay={:.2} ticks",
                replication,
                stats.dispatched,
                stats.finished,
                stats.mean_delay()
            );
            results.push(stats);
        }
        Ok(results)
    }

    pub fn stats(&self) -> CorridorStats {
        let stops = self
            .stops
            .iter()
            .map(|stop| {
                let records: Vec<_> = self
                    .fleet
                    .iter()
                    .filter(|bus| bus.is_peak)
                    .filter_map(|bus| bus.record(stop.id))
                    .filter(|record| record.visited)
                    .collect();
                let n = records.len();
                let mean = |f: fn(&StopRecord) -> f64| {
                    if n == 0 {
                        0.0
                    } else {
                        records.iter().map(|r| f(r)).sum::<f64>() / n as f64
                    }
                };
                StopStats {
                    stop: stop.id,
                    buses: n,
                    mean_entry_delay: mean(|r| r.entry_delay),
                    mean_exit_delay: mean(|r| r.exit_delay),
                    mean_service_time: mean(|r| r.service_time),
                }
            })
            .collect();

        CorridorStats {
            dispatched: self.fleet.len(),
            finished: self
                .fleet
                .iter()
                .filter(|bus| bus.finished_tick.is_some())
                .count(),
            stops,
        }
    }

    /// Print a summary of the current corridor state
    pub fn print_summary(&self) {
        println!("=== Corridor at tick {} ===", self.time);
        println!(
            "Buses dispatched: {}, finished: {}",
            self.fleet.len(),
            self.fleet
                .iter()
                .filter(|bus| bus.finished_tick.is_some())
                .count()
        );

        println!("--- Stops ---");
        for stop in &self.stops {
            let berths: String = stop
                .berths()
                .iter()
                .map(|slot| if slot.is_some() { 'B' } else { '.' })
                .collect();
            println!(
                "  Stop {:?}: berths=[{}], waiting={}, line pax={:.1}, common pax={:.1}",
                stop.id.0 .0,
                berths,
                stop.wait_zone_len(),
                stop.uncommon_queue().total(),
                stop.common_queue().total()
            );
        }

        println!("--- Links ---");
        for link in self.links.iter() {
            println!(
                "  Link {:?} -> stop {:?}: buses={}",
                link.id.0 .0,
                link.to_stop.0 .0,
                link.buses().count()
            );
        }
    }
}
