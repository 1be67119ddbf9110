//! A transit stop: berths, wait zone and passenger queues
//!
//! Each tick a stop accrues passengers (`pax_arrival`), then `operation` runs
//! entering → boarding/alighting → leaving, and `update_bus_stats` charges
//! every peak bus present with one tick of service time or delay.
//!
//! Berth 0 is the most upstream berth. Buses are held by id; the fleet owns
//! them.

use log::{debug, warn};
use rand::Rng;
use std::collections::{BTreeMap, VecDeque};

use super::bus::{BusFleet, SimBus};
use super::config::StopConfig;
use super::demand_queue::DemandQueue;
use super::error::SimError;
use super::link::BusSink;
use super::snapshot::{BerthSnapshot, QueueLevel, StopSnapshot, WaitSnapshot};
use super::types::{
    BusId, EnteringType, GroupId, LineId, LinkId, QueuingRule, StopId, ENTRY_PENALTY_TICKS,
};

/// What happened to a bus handed to `bus_arrival`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalOutcome {
    /// Joined the wait zone
    Queued,
    /// Nobody to drop off and its line is already at the stop, so it drove on
    Bypassed,
}

/// The queue a bus boards from on a given tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoardingSource {
    Common(GroupId),
    Uncommon(LineId),
}

/// A stop in the corridor simulation
#[derive(Debug, Clone)]
pub struct SimStop {
    pub id: StopId,
    berth_size: usize,
    /// The bus occupying each berth, if any
    buses_in_berths: Vec<Option<BusId>>,
    /// Mirrors `buses_in_berths[i].is_some()`
    servicing_mark: Vec<bool>,
    wait_zone: VecDeque<BusId>,
    lines: Vec<LineId>,
    /// Passengers any bus of the group may take
    common_queue: DemandQueue<GroupId>,
    /// Passengers only their own line may take
    uncommon_queue: DemandQueue<LineId>,
    line_groups: BTreeMap<LineId, GroupId>,
    group_line_size: usize,
    common_ratio: f64,
    entering_type: EnteringType,
    overtake_in: bool,
    overtake_out: bool,
    allocation_plan: BTreeMap<LineId, usize>,
    /// Downstream link; `None` makes this the terminal stop
    next_link: Option<LinkId>,
    clock: u64,
}

impl SimStop {
    pub fn new(
        id: StopId,
        berth_size: usize,
        line_demand: &BTreeMap<LineId, f64>,
        entering_type: EnteringType,
        queuing_rule: QueuingRule,
        common_ratio: f64,
        line_groups: BTreeMap<LineId, GroupId>,
    ) -> Result<Self, SimError> {
        if berth_size == 0 {
            return Err(SimError::InvalidConfiguration(format!(
                "stop {:?} has no berths",
                id
            )));
        }
        if !(0.0..=1.0).contains(&common_ratio) {
            return Err(SimError::InvalidConfiguration(format!(
                "common ratio {common_ratio} outside [0, 1]"
            )));
        }

        let mut uncommon_rates = BTreeMap::new();
        let mut common_rates: BTreeMap<GroupId, f64> = BTreeMap::new();
        for (line, demand) in line_demand {
            let group = *line_groups.get(line).ok_or_else(|| {
                SimError::InvalidConfiguration(format!("{line} has no group assignment"))
            })?;
            uncommon_rates.insert(*line, demand * (1.0 - common_ratio));
            *common_rates.entry(group).or_insert(0.0) += demand * common_ratio;
        }

        Ok(Self {
            id,
            berth_size,
            buses_in_berths: vec![None; berth_size],
            servicing_mark: vec![false; berth_size],
            wait_zone: VecDeque::new(),
            lines: line_demand.keys().copied().collect(),
            common_queue: DemandQueue::new(common_rates),
            uncommon_queue: DemandQueue::new(uncommon_rates),
            group_line_size: line_demand.len() / berth_size,
            line_groups,
            common_ratio,
            entering_type,
            overtake_in: queuing_rule.overtake_in(),
            overtake_out: queuing_rule.overtake_out(),
            allocation_plan: BTreeMap::new(),
            next_link: None,
            clock: 0,
        })
    }

    /// Build a stop from its scenario entry, including any allocation plan
    pub fn from_config(id: StopId, config: &StopConfig) -> Result<Self, SimError> {
        let entering_type = config.entering_type.parse::<EnteringType>()?;
        let queuing_rule = config.queuing_rule.parse::<QueuingRule>()?;
        let line_demand: BTreeMap<LineId, f64> = config
            .line_demand
            .iter()
            .map(|(line, demand)| (LineId(*line), *demand))
            .collect();
        let line_groups: BTreeMap<LineId, GroupId> = config
            .line_groups
            .iter()
            .map(|(line, group)| (LineId(*line), GroupId(*group)))
            .collect();

        let mut stop = Self::new(
            id,
            config.berths,
            &line_demand,
            entering_type,
            queuing_rule,
            config.common_ratio,
            line_groups,
        )?;

        if let Some(plan) = &config.allocation_plan {
            stop.add_allocation_plan(
                plan.iter()
                    .map(|(line, berth)| (LineId(*line), *berth))
                    .collect(),
            )?;
        }
        Ok(stop)
    }

    pub fn set_next_link(&mut self, link: Option<LinkId>) {
        self.next_link = link;
    }

    /// Fix each line's target berth; only meaningful for allocation stops
    pub fn add_allocation_plan(&mut self, plan: BTreeMap<LineId, usize>) -> Result<(), SimError> {
        if self.entering_type != EnteringType::Allocation {
            warn!(
                "Stop {:?} is not an allocation stop, ignoring allocation plan",
                self.id
            );
            return Ok(());
        }
        if let Some((line, berth)) = plan.iter().find(|(_, berth)| **berth >= self.berth_size) {
            return Err(SimError::InvalidConfiguration(format!(
                "{line} allocated to berth {berth} but stop {:?} has {} berths",
                self.id, self.berth_size
            )));
        }
        self.allocation_plan.extend(plan);
        Ok(())
    }

    /// Start a fresh replication, keeping the configuration
    pub fn reset(&mut self) {
        self.clock = 0;
        self.uncommon_queue.reset();
        self.common_queue.reset();
        self.buses_in_berths.fill(None);
        self.servicing_mark.fill(false);
        self.wait_zone.clear();
    }

    /// One tick of passenger arrivals on both queues
    pub fn pax_arrival<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.uncommon_queue.arrival(rng);
        self.common_queue.arrival(rng);
    }

    /// Cap waiting passengers so demand can't grow without bound
    pub fn pax_demand_bounding(&mut self, bound: f64) {
        self.common_queue
            .pax_demand_bounding(self.common_ratio * bound * self.group_line_size as f64);
        self.uncommon_queue
            .pax_demand_bounding((1.0 - self.common_ratio) * bound);
    }

    /// A bus reaches the stop from the upstream link
    pub fn bus_arrival(
        &mut self,
        bus_id: BusId,
        fleet: &mut BusFleet,
        links: &mut dyn BusSink,
    ) -> Result<ArrivalOutcome, SimError> {
        let bus = fleet.get_mut(bus_id)?;
        bus.mark_stop_visited(self.id, self.clock);
        let alighting = bus.determine_alighting_pax();
        let line = bus.line;

        if alighting > 0.0 || !self.has_line_present(line, fleet)? {
            self.wait_zone.push_back(bus_id);
            return Ok(ArrivalOutcome::Queued);
        }

        debug!(
            "Bus {:?} ({}) skips stop {:?}, line already present",
            bus_id, line, self.id
        );
        self.forward(bus_id, fleet, links)?;
        Ok(ArrivalOutcome::Bypassed)
    }

    /// Whether a bus of `line` is in a berth or the wait zone
    fn has_line_present(&self, line: LineId, fleet: &BusFleet) -> Result<bool, SimError> {
        for id in self.buses_in_berths.iter().flatten().chain(self.wait_zone.iter()) {
            if fleet.get(*id)?.line == line {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Hand a departing bus to the next link, or finish it at the terminal stop
    fn forward(&self, bus: BusId, fleet: &mut BusFleet, links: &mut dyn BusSink) -> Result<(), SimError> {
        match self.next_link {
            Some(link) => links.receive_bus(link, bus),
            None => {
                fleet.get_mut(bus)?.finish(self.clock);
                Ok(())
            }
        }
    }

    /// Move buses from the head of the wait zone into berths
    pub fn entering(&mut self, fleet: &mut BusFleet) -> Result<(), SimError> {
        if self.wait_zone.is_empty() {
            return Ok(());
        }
        match self.entering_type {
            EnteringType::Normal => self.normal_entering(fleet),
            EnteringType::Allocation => self.allocation_entering(fleet),
        }
    }

    fn normal_entering(&mut self, fleet: &mut BusFleet) -> Result<(), SimError> {
        while let Some(&bus) = self.wait_zone.front() {
            let berth = if self.overtake_in {
                // most downstream empty berth
                (0..self.berth_size).rev().find(|&c| !self.servicing_mark[c])
            } else {
                // furthest empty berth reachable without passing a busy one
                (0..self.berth_size)
                    .take_while(|&c| !self.servicing_mark[c])
                    .last()
            };

            match berth {
                Some(berth) => self.push_bus_to_berth(bus, berth, fleet)?,
                None => break,
            }
        }
        Ok(())
    }

    fn allocation_entering(&mut self, fleet: &mut BusFleet) -> Result<(), SimError> {
        while let Some(&bus) = self.wait_zone.front() {
            let line = fleet.get(bus)?.line;
            let target = *self.allocation_plan.get(&line).ok_or_else(|| {
                SimError::InvalidKey(format!("{line} has no berth in stop {:?} allocation plan", self.id))
            })?;

            if self.servicing_mark[target] {
                break;
            }
            let blocked = self.servicing_mark[..target].iter().any(|&busy| busy);
            if blocked && !self.overtake_in {
                break;
            }
            self.push_bus_to_berth(bus, target, fleet)?;
        }
        Ok(())
    }

    fn push_bus_to_berth(&mut self, bus: BusId, berth: usize, fleet: &mut BusFleet) -> Result<(), SimError> {
        fleet.get_mut(bus)?.lost_time = ENTRY_PENALTY_TICKS;
        self.buses_in_berths[berth] = Some(bus);
        self.wait_zone.pop_front();
        self.servicing_mark[berth] = true;
        debug!(
            "Bus {:?} entered berth {} of stop {:?} at tick {}",
            bus, berth, self.id, self.clock
        );
        Ok(())
    }

    /// Alight and board every bus in a berth whose entry penalty has run out
    pub fn pax_on_off<R: Rng + ?Sized>(&mut self, fleet: &mut BusFleet, rng: &mut R) -> Result<(), SimError> {
        for berth in 0..self.berth_size {
            let Some(bus_id) = self.buses_in_berths[berth] else {
                continue;
            };
            let bus = fleet.get_mut(bus_id)?;
            if bus.lost_time > 0 {
                bus.lost_time -= 1;
                continue;
            }

            let line = bus.line;
            bus.alight();

            let group = self.group_of(line)?;
            let common = self.common_queue.query(group)?;
            let uncommon = self.uncommon_queue.query(line)?;
            let source = match (common > 0.0, uncommon > 0.0) {
                (true, true) => {
                    if rng.random_bool(0.5) {
                        BoardingSource::Common(group)
                    } else {
                        BoardingSource::Uncommon(line)
                    }
                }
                (true, false) => BoardingSource::Common(group),
                (false, true) => BoardingSource::Uncommon(line),
                (false, false) => continue,
            };

            match source {
                BoardingSource::Common(group) => {
                    let boarded = bus.board(common);
                    self.common_queue.decrease(group, boarded)?;
                }
                BoardingSource::Uncommon(line) => {
                    let boarded = bus.board(uncommon);
                    self.uncommon_queue.decrease(line, boarded)?;
                }
            }
        }
        Ok(())
    }

    /// Release buses that are done, most downstream berth first
    pub fn leaving(&mut self, fleet: &mut BusFleet, links: &mut dyn BusSink) -> Result<(), SimError> {
        for berth in (0..self.berth_size).rev() {
            let Some(bus_id) = self.buses_in_berths[berth] else {
                continue;
            };
            if !self.boarding_alighting_completed(fleet.get(bus_id)?)? || !self.can_leave(berth) {
                continue;
            }
            self.forward(bus_id, fleet, links)?;
            self.buses_in_berths[berth] = None;
            self.servicing_mark[berth] = false;
            debug!(
                "Bus {:?} left berth {} of stop {:?} at tick {}",
                bus_id, berth, self.id, self.clock
            );
        }
        Ok(())
    }

    /// Whether the bus in `berth` has a clear way out
    pub fn can_leave(&self, berth: usize) -> bool {
        if self.overtake_out || berth + 1 >= self.berth_size {
            return true;
        }
        self.servicing_mark[berth + 1..].iter().all(|&busy| !busy)
    }

    /// No one left to get off, and nobody it could still take is waiting
    pub fn boarding_alighting_completed(&self, bus: &SimBus) -> Result<bool, SimError> {
        if bus.is_alighting() {
            return Ok(false);
        }
        let has_space = bus.remaining_space() > 0.0;
        if has_space && self.uncommon_queue.query(bus.line)? > 0.0 {
            return Ok(false);
        }
        let group = self.group_of(bus.line)?;
        if has_space && self.common_queue.query(group)? > 0.0 {
            return Ok(false);
        }
        Ok(true)
    }

    /// entering → boarding/alighting → leaving, then advance the clock
    pub fn operation<R: Rng + ?Sized>(
        &mut self,
        fleet: &mut BusFleet,
        links: &mut dyn BusSink,
        rng: &mut R,
    ) -> Result<(), SimError> {
        self.entering(fleet)?;
        self.pax_on_off(fleet, rng)?;
        self.leaving(fleet, links)?;
        self.clock += 1;
        Ok(())
    }

    /// Charge one tick of service time, exit delay or entry delay to every peak bus here
    pub fn update_bus_stats(&self, fleet: &mut BusFleet) -> Result<(), SimError> {
        for (berth, bus_id) in self.buses_in_berths.iter().enumerate() {
            let Some(bus_id) = *bus_id else {
                continue;
            };
            let completed = self.boarding_alighting_completed(fleet.get(bus_id)?)?;
            let bus = fleet.get_mut(bus_id)?;
            if !bus.is_peak {
                continue;
            }
            let record = bus.record_mut(self.id);
            if !completed {
                record.service_time += 1.0;
            } else if !self.can_leave(berth) {
                record.exit_delay += 1.0;
            }
        }

        for bus_id in &self.wait_zone {
            let bus = fleet.get_mut(*bus_id)?;
            if bus.is_peak {
                let record = bus.record_mut(self.id);
                record.entry_delay += 1.0;
            }
        }
        Ok(())
    }

    /// Positions of every bus at the stop plus line queue levels, keyed at `tick`
    ///
    /// `operation` has already advanced the clock, so the caller passes the
    /// tick the state belongs to.
    pub fn snapshot(&self, fleet: &BusFleet, tick: u64) -> Result<StopSnapshot, SimError> {
        let mut berths = Vec::new();
        for (berth, bus_id) in self.buses_in_berths.iter().enumerate() {
            let Some(bus_id) = *bus_id else {
                continue;
            };
            let bus = fleet.get(bus_id)?;
            berths.push(BerthSnapshot {
                bus: bus_id,
                berth,
                line: bus.line,
                is_serving: !self.boarding_alighting_completed(bus)?,
            });
        }

        let wait_zone = self
            .wait_zone
            .iter()
            .enumerate()
            .map(|(wait_position, bus_id)| {
                Ok(WaitSnapshot {
                    bus: *bus_id,
                    wait_position,
                    line: fleet.get(*bus_id)?.line,
                })
            })
            .collect::<Result<Vec<_>, SimError>>()?;

        let pax_queues = self
            .lines
            .iter()
            .map(|line| {
                Ok(QueueLevel {
                    line: *line,
                    stop: self.id,
                    tick,
                    level: self.uncommon_queue.query(*line)?,
                })
            })
            .collect::<Result<Vec<_>, SimError>>()?;

        Ok(StopSnapshot {
            stop: self.id,
            tick,
            berths,
            wait_zone,
            pax_queues,
        })
    }

    pub fn group_of(&self, line: LineId) -> Result<GroupId, SimError> {
        self.line_groups
            .get(&line)
            .copied()
            .ok_or_else(|| SimError::InvalidKey(format!("{line} has no group at stop {:?}", self.id)))
    }

    pub fn common_level(&self, group: GroupId) -> Result<f64, SimError> {
        self.common_queue.query(group)
    }

    pub fn uncommon_level(&self, line: LineId) -> Result<f64, SimError> {
        self.uncommon_queue.query(line)
    }

    pub fn common_queue(&self) -> &DemandQueue<GroupId> {
        &self.common_queue
    }

    pub fn uncommon_queue(&self) -> &DemandQueue<LineId> {
        &self.uncommon_queue
    }

    pub fn berth(&self, berth: usize) -> Option<BusId> {
        self.buses_in_berths.get(berth).copied().flatten()
    }

    pub fn berths(&self) -> &[Option<BusId>] {
        &self.buses_in_berths
    }

    pub fn servicing_marks(&self) -> &[bool] {
        &self.servicing_mark
    }

    pub fn wait_zone(&self) -> impl Iterator<Item = BusId> + '_ {
        self.wait_zone.iter().copied()
    }

    pub fn wait_zone_len(&self) -> usize {
        self.wait_zone.len()
    }

    pub fn berth_size(&self) -> usize {
        self.berth_size
    }

    pub fn lines(&self) -> &[LineId] {
        &self.lines
    }

    pub fn group_line_size(&self) -> usize {
        self.group_line_size
    }

    pub fn common_ratio(&self) -> f64 {
        self.common_ratio
    }

    pub fn entering_type(&self) -> EnteringType {
        self.entering_type
    }

    pub fn overtake_in(&self) -> bool {
        self.overtake_in
    }

    pub fn overtake_out(&self) -> bool {
        self.overtake_out
    }

    pub fn allocation_plan(&self) -> &BTreeMap<LineId, usize> {
        &self.allocation_plan
    }

    pub fn next_link(&self) -> Option<LinkId> {
        self.next_link
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Buses currently in a berth or the wait zone
    pub fn bus_count(&self) -> usize {
        self.buses_in_berths.iter().flatten().count() + self.wait_zone.len()
    }
}
