//! Links carrying buses between stops
//!
//! A link is a fixed travel time. Buses are handed to it by the upstream stop
//! (or the dispatcher) and released to the downstream stop once that time has
//! passed.

use std::collections::VecDeque;

use super::error::SimError;
use super::types::{BusId, LinkId, SimId, StopId};

/// Anything a stop can forward a departing bus to
pub trait BusSink {
    fn receive_bus(&mut self, link: LinkId, bus: BusId) -> Result<(), SimError>;
}

/// A road segment feeding buses into one stop
#[derive(Debug, Clone)]
pub struct SimLink {
    pub id: LinkId,
    pub to_stop: StopId,
    pub travel_ticks: u64,
    /// Buses on the link with the tick they reach the stop, in entry order
    buses: VecDeque<(BusId, u64)>,
}

impl SimLink {
    pub fn new(id: LinkId, to_stop: StopId, travel_ticks: u64) -> Self {
        Self {
            id,
            to_stop,
            travel_ticks,
            buses: VecDeque::new(),
        }
    }

    pub fn bus_entering_link(&mut self, bus: BusId, now: u64) {
        self.buses.push_back((bus, now + self.travel_ticks));
    }

    /// Pop every bus whose travel time has elapsed by `now`
    pub fn release(&mut self, now: u64) -> Vec<BusId> {
        let mut released = Vec::new();
        while let Some(&(bus, due)) = self.buses.front() {
            if due > now {
                break;
            }
            self.buses.pop_front();
            released.push(bus);
        }
        released
    }

    pub fn buses(&self) -> impl Iterator<Item = BusId> + '_ {
        self.buses.iter().map(|(bus, _)| *bus)
    }

    pub fn reset(&mut self) {
        self.buses.clear();
    }
}

/// All links of a corridor, stamped with the current tick
#[derive(Debug, Clone, Default)]
pub struct LinkTable {
    links: Vec<SimLink>,
    now: u64,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_link(&mut self, to_stop: StopId, travel_ticks: u64) -> LinkId {
        let id = LinkId(SimId(self.links.len()));
        self.links.push(SimLink::new(id, to_stop, travel_ticks));
        id
    }

    pub fn set_now(&mut self, now: u64) {
        self.now = now;
    }

    pub fn get(&self, id: LinkId) -> Option<&SimLink> {
        self.links.get(id.0 .0)
    }

    pub fn get_mut(&mut self, id: LinkId) -> Option<&mut SimLink> {
        self.links.get_mut(id.0 .0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimLink> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Release due buses from every link, as (destination stop, bus) pairs
    pub fn release_all(&mut self) -> Vec<(StopId, BusId)> {
        let now = self.now;
        self.links
            .iter_mut()
            .flat_map(|link| {
                let to_stop = link.to_stop;
                link.release(now).into_iter().map(move |bus| (to_stop, bus))
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.now = 0;
        for link in &mut self.links {
            link.reset();
        }
    }
}

impl BusSink for LinkTable {
    fn receive_bus(&mut self, link: LinkId, bus: BusId) -> Result<(), SimError> {
        let now = self.now;
        let link = self.get_mut(link).ok_or(SimError::UnknownLink(link))?;
        link.bus_entering_link(bus, now);
        Ok(())
    }
}
