//! Per-tick snapshots of stop state for external reporting
//!
//! `StopSnapshot` is what a stop exposes each tick. `SnapshotLog` folds those
//! snapshots (and bus positions on links) into one JSON document keyed by
//! bus and tick.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::types::{BusId, LineId, LinkId, StopId};

/// A bus parked in a berth
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BerthSnapshot {
    pub bus: BusId,
    pub berth: usize,
    pub line: LineId,
    /// Still boarding or alighting
    pub is_serving: bool,
}

/// A bus queued in the wait zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitSnapshot {
    pub bus: BusId,
    pub wait_position: usize,
    pub line: LineId,
}

/// Line-specific passengers waiting at a stop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueLevel {
    pub line: LineId,
    pub stop: StopId,
    pub tick: u64,
    pub level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopSnapshot {
    pub stop: StopId,
    pub tick: u64,
    pub berths: Vec<BerthSnapshot>,
    pub wait_zone: Vec<WaitSnapshot>,
    pub pax_queues: Vec<QueueLevel>,
}

/// Marker used in place of a link or berth id when the bus is not on one
const NOT_PRESENT: i64 = -1;

/// JSON document of bus positions and queue levels over a run
#[derive(Debug, Clone)]
pub struct SnapshotLog {
    root: Value,
}

impl Default for SnapshotLog {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotLog {
    pub fn new() -> Self {
        Self {
            root: json!({ "buses": {}, "pax_queues": {} }),
        }
    }

    /// Slot for `buses/<bus>/<tick>`, created on demand
    fn bus_entry(&mut self, bus: BusId, tick: u64) -> &mut Map<String, Value> {
        let entry = &mut self.root["buses"][bus.0 .0.to_string()][tick.to_string()];
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("entry was just made an object"),
        }
    }

    pub fn record_stop(&mut self, snapshot: &StopSnapshot) {
        let stop = snapshot.stop.0 .0;
        let tick = snapshot.tick;

        for berth in &snapshot.berths {
            let entry = self.bus_entry(berth.bus, tick);
            entry.insert("link_id".into(), json!(NOT_PRESENT));
            entry.insert("stop_id".into(), json!(stop));
            entry.insert("berth_id".into(), json!(berth.berth));
            entry.insert("is_serving".into(), json!(berth.is_serving));
            entry.insert("line_no".into(), json!(berth.line.0));
        }

        for waiting in &snapshot.wait_zone {
            let entry = self.bus_entry(waiting.bus, tick);
            entry.insert("link_id".into(), json!(NOT_PRESENT));
            entry.insert("stop_id".into(), json!(stop));
            entry.insert("berth_id".into(), json!(NOT_PRESENT));
            entry.insert("wait_position".into(), json!(waiting.wait_position));
            entry.insert("line_no".into(), json!(waiting.line.0));
        }

        for queue in &snapshot.pax_queues {
            self.root["pax_queues"][queue.line.0.to_string()][tick.to_string()]
                [stop.to_string()] = json!(queue.level);
        }
    }

    pub fn record_link(&mut self, link: LinkId, tick: u64, buses: &[(BusId, LineId)]) {
        for (bus, line) in buses {
            let entry = self.bus_entry(*bus, tick);
            entry.insert("link_id".into(), json!(link.0 .0));
            entry.insert("line_no".into(), json!(line.0));
        }
    }

    pub fn as_json(&self) -> &Value {
        &self.root
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create snapshot file {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), &self.root)
            .context("Failed to write snapshot JSON")?;
        Ok(())
    }
}
