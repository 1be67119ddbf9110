//! Buses and the fleet arena that owns them
//!
//! Stops and links only hold `BusId`s; the `BusFleet` is the single owner of
//! every bus in a replication.

use std::collections::HashMap;

use super::error::SimError;
use super::types::{BusId, LineId, SimId, StopId};

/// What a bus recorded while visiting one stop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopRecord {
    pub visited: bool,
    /// Passengers on board when the bus reached the stop
    pub pax_on_arrival: f64,
    pub arrival_tick: u64,
    /// Ticks spent in the wait zone
    pub entry_delay: f64,
    /// Ticks spent in a berth after service finished, blocked from leaving
    pub exit_delay: f64,
    /// Ticks spent boarding and alighting
    pub service_time: f64,
}

impl StopRecord {
    /// Ticks lost at the stop, waiting to enter or blocked from leaving
    pub fn delay(&self) -> f64 {
        self.entry_delay + self.exit_delay
    }
}

/// Static parameters a bus is created with
#[derive(Debug, Clone, PartialEq)]
pub struct BusParams {
    pub capacity: f64,
    /// Passengers boarded per tick
    pub board_rate: f64,
    /// Passengers alighted per tick
    pub alight_rate: f64,
    /// Share of on-board passengers getting off at each stop
    pub alight_ratio: f64,
    pub initial_pax: f64,
}

impl Default for BusParams {
    fn default() -> Self {
        Self {
            capacity: 80.0,
            board_rate: 0.25,
            alight_rate: 0.5,
            alight_ratio: 0.1,
            initial_pax: 0.0,
        }
    }
}

/// A bus in the corridor simulation
#[derive(Debug, Clone)]
pub struct SimBus {
    pub id: BusId,
    pub line: LineId,
    pub params: BusParams,
    /// Passengers currently on board
    pub pax: f64,
    /// Passengers still to alight at the current stop
    pub alighting_pax: f64,
    /// Ticks of entry penalty left before passenger exchange may start
    pub lost_time: u32,
    /// Only peak buses accumulate delay statistics
    pub is_peak: bool,
    pub dispatch_tick: u64,
    pub finished_tick: Option<u64>,
    pub records: HashMap<StopId, StopRecord>,
}

impl SimBus {
    pub fn new(id: BusId, line: LineId, params: BusParams, dispatch_tick: u64, is_peak: bool) -> Self {
        Self {
            id,
            line,
            pax: params.initial_pax.min(params.capacity).max(0.0),
            params,
            alighting_pax: 0.0,
            lost_time: 0,
            is_peak,
            dispatch_tick,
            finished_tick: None,
            records: HashMap::new(),
        }
    }

    /// Record arrival at `stop`: visit flag, passenger count and arrival tick
    pub fn mark_stop_visited(&mut self, stop: StopId, tick: u64) {
        let pax = self.pax;
        let record = self.records.entry(stop).or_default();
        record.visited = true;
        record.pax_on_arrival = pax;
        record.arrival_tick = tick;
    }

    /// Decide how many passengers get off at the stop just reached
    pub fn determine_alighting_pax(&mut self) -> f64 {
        self.alighting_pax = (self.pax * self.params.alight_ratio).floor();
        self.alighting_pax
    }

    /// Let one tick's worth of passengers off
    pub fn alight(&mut self) -> f64 {
        let n = self.alighting_pax.min(self.params.alight_rate);
        self.alighting_pax -= n;
        self.pax = (self.pax - n).max(0.0);
        n
    }

    /// Board up to one tick's worth of the `available` passengers
    ///
    /// Returns the number actually boarded, never more than `available` or
    /// the remaining space.
    pub fn board(&mut self, available: f64) -> f64 {
        let n = available
            .min(self.params.board_rate)
            .min(self.remaining_space())
            .max(0.0);
        self.pax += n;
        n
    }

    pub fn remaining_space(&self) -> f64 {
        (self.params.capacity - self.pax).max(0.0)
    }

    pub fn is_alighting(&self) -> bool {
        self.alighting_pax > 0.0
    }

    pub fn finish(&mut self, tick: u64) {
        self.finished_tick = Some(tick);
    }

    pub fn record(&self, stop: StopId) -> Option<&StopRecord> {
        self.records.get(&stop)
    }

    pub fn record_mut(&mut self, stop: StopId) -> &mut StopRecord {
        self.records.entry(stop).or_default()
    }
}

/// Arena of every bus dispatched in a replication
#[derive(Debug, Clone, Default)]
pub struct BusFleet {
    buses: Vec<SimBus>,
}

impl BusFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, line: LineId, params: BusParams, dispatch_tick: u64, is_peak: bool) -> BusId {
        let id = BusId(SimId(self.buses.len()));
        self.buses
            .push(SimBus::new(id, line, params, dispatch_tick, is_peak));
        id
    }

    pub fn get(&self, id: BusId) -> Result<&SimBus, SimError> {
        self.buses.get(id.0 .0).ok_or(SimError::UnknownBus(id))
    }

    pub fn get_mut(&mut self, id: BusId) -> Result<&mut SimBus, SimError> {
        self.buses.get_mut(id.0 .0).ok_or(SimError::UnknownBus(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimBus> {
        self.buses.iter()
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    pub fn clear(&mut self) {
        self.buses.clear();
    }
}
