//! Scenario configuration loaded from JSON
//!
//! A corridor is a chain of stops, each fed by a link from the previous stop
//! (the first link starts at the depot). Line services dispatch buses at a
//! fixed headway onto the first link.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::bus::BusParams;

fn default_entering_type() -> String {
    "normal".to_string()
}

fn default_queuing_rule() -> String {
    "fifo".to_string()
}

/// One stop of the corridor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopConfig {
    pub berths: usize,
    /// Line number → passengers arriving per tick
    pub line_demand: BTreeMap<u32, f64>,
    #[serde(default = "default_entering_type")]
    pub entering_type: String,
    #[serde(default = "default_queuing_rule")]
    pub queuing_rule: String,
    /// Share of each line's demand that any bus of its group may serve
    #[serde(default)]
    pub common_ratio: f64,
    /// Line number → group number
    pub line_groups: BTreeMap<u32, u32>,
    /// Line number → target berth, for allocation stops
    #[serde(default)]
    pub allocation_plan: Option<BTreeMap<u32, usize>>,
    /// Travel time of the link leading into this stop
    #[serde(default)]
    pub link_travel_ticks: u64,
}

/// Buses of one line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineService {
    pub line: u32,
    /// Ticks between consecutive dispatches
    pub headway: u64,
    /// Tick of the first dispatch
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_capacity")]
    pub capacity: f64,
    #[serde(default = "default_board_rate")]
    pub board_rate: f64,
    #[serde(default = "default_alight_rate")]
    pub alight_rate: f64,
    #[serde(default = "default_alight_ratio")]
    pub alight_ratio: f64,
    #[serde(default)]
    pub initial_pax: f64,
}

fn default_capacity() -> f64 {
    BusParams::default().capacity
}

fn default_board_rate() -> f64 {
    BusParams::default().board_rate
}

fn default_alight_rate() -> f64 {
    BusParams::default().alight_rate
}

fn default_alight_ratio() -> f64 {
    BusParams::default().alight_ratio
}

impl LineService {
    pub fn bus_params(&self) -> BusParams {
        BusParams {
            capacity: self.capacity,
            board_rate: self.board_rate,
            alight_rate: self.alight_rate,
            alight_ratio: self.alight_ratio,
            initial_pax: self.initial_pax,
        }
    }

    /// Whether a bus of this line leaves the depot at `tick`
    pub fn dispatches_at(&self, tick: u64) -> bool {
        self.headway > 0 && tick >= self.offset && (tick - self.offset) % self.headway == 0
    }
}

/// A full corridor scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorridorConfig {
    pub stops: Vec<StopConfig>,
    pub services: Vec<LineService>,
    /// Buses dispatched in [peak_start, peak_end) are tracked for statistics
    #[serde(default)]
    pub peak_start: u64,
    #[serde(default)]
    pub peak_end: Option<u64>,
    /// Optional per-line ceiling on waiting passengers
    #[serde(default)]
    pub demand_bound: Option<f64>,
}

impl CorridorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse corridor configuration")
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn is_peak(&self, tick: u64) -> bool {
        tick >= self.peak_start && self.peak_end.map_or(true, |end| tick < end)
    }

    /// Three stops, four lines in two groups, two berths per stop
    pub fn demo() -> Self {
        let line_demand: BTreeMap<u32, f64> = (0..4).map(|line| (line, 0.02)).collect();
        let line_groups: BTreeMap<u32, u32> = (0..4).map(|line| (line, line / 2)).collect();

        let stop = |queuing_rule: &str, entering_type: &str, plan: Option<BTreeMap<u32, usize>>| StopConfig {
            berths: 2,
            line_demand: line_demand.clone(),
            entering_type: entering_type.to_string(),
            queuing_rule: queuing_rule.to_string(),
            common_ratio: 0.5,
            line_groups: line_groups.clone(),
            allocation_plan: plan,
            link_travel_ticks: 60,
        };

        let plan = line_groups
            .iter()
            .map(|(line, group)| (*line, *group as usize))
            .collect();

        Self {
            stops: vec![
                stop("fifo", "normal", None),
                stop("free_overtaking", "normal", None),
                stop("fifo", "allocation", Some(plan)),
            ],
            services: (0..4)
                .map(|line| LineService {
                    line,
                    headway: 120,
                    offset: line as u64 * 15,
                    capacity: default_capacity(),
                    board_rate: default_board_rate(),
                    alight_rate: default_alight_rate(),
                    alight_ratio: default_alight_ratio(),
                    initial_pax: 20.0,
                })
                .collect(),
            peak_start: 0,
            peak_end: None,
            demand_bound: Some(200.0),
        }
    }
}
