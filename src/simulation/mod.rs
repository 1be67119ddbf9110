//! Bus corridor simulation module
//!
//! This module contains the core simulation of transit stops: berths, wait
//! zones, passenger demand queues and the links and buses around them. It
//! runs headless and can be driven tick by tick from tests or the CLI.

mod bus;
mod config;
mod corridor;
mod demand_queue;
mod error;
mod link;
mod snapshot;
mod stop;
mod types;

// Re-export public types for external use
pub use bus::{BusFleet, BusParams, SimBus, StopRecord};
pub use config::{CorridorConfig, LineService, StopConfig};
pub use corridor::{CorridorStats, SimCorridor, StopStats};
pub use demand_queue::{sample_poisson, DemandQueue};
pub use error::SimError;
pub use link::{BusSink, LinkTable, SimLink};
pub use snapshot::{BerthSnapshot, QueueLevel, SnapshotLog, StopSnapshot, WaitSnapshot};
pub use stop::{ArrivalOutcome, SimStop};
pub use types::{
    BusId, EnteringType, GroupId, LineId, LinkId, QueuingRule, SimId, StopId, ENTRY_PENALTY_TICKS,
};
