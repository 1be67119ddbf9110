//! Core types for the bus corridor simulation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::SimError;

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimId(pub usize);

/// A wrapper type for bus IDs (index into the bus fleet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusId(pub SimId);

/// A wrapper type for stop IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StopId(pub SimId);

/// A wrapper type for link IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub SimId);

/// A bus line number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId(pub u32);

/// A line-group sharing common passenger demand at a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {}", self.0)
    }
}

/// How a bus in the wait zone picks its berth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnteringType {
    /// Take whichever berth the queuing rule allows
    Normal,
    /// Each line has a fixed target berth
    Allocation,
}

impl FromStr for EnteringType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" | "Normal" => Ok(EnteringType::Normal),
            "allocation" | "Allocation" => Ok(EnteringType::Allocation),
            other => Err(SimError::InvalidConfiguration(format!(
                "unknown entering type '{other}'"
            ))),
        }
    }
}

/// Queuing discipline at the berths of a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuingRule {
    Fifo,
    LimitedOvertaking,
    FreeOvertaking,
    FreeOvertakingWithBlock,
}

impl QueuingRule {
    /// Whether a bus may skip a busy upstream berth when entering
    pub fn overtake_in(&self) -> bool {
        matches!(
            self,
            QueuingRule::FreeOvertaking | QueuingRule::FreeOvertakingWithBlock
        )
    }

    /// Whether a bus may leave while a downstream berth is occupied
    pub fn overtake_out(&self) -> bool {
        matches!(
            self,
            QueuingRule::LimitedOvertaking | QueuingRule::FreeOvertaking
        )
    }
}

impl FromStr for QueuingRule {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fifo" | "FIFO" => Ok(QueuingRule::Fifo),
            "limited_overtaking" | "LimitedOvertaking" => Ok(QueuingRule::LimitedOvertaking),
            "free_overtaking" | "FreeOvertaking" => Ok(QueuingRule::FreeOvertaking),
            "free_overtaking_with_block" | "FreeOvertakingWithBlock" => {
                Ok(QueuingRule::FreeOvertakingWithBlock)
            }
            other => Err(SimError::InvalidConfiguration(format!(
                "unknown queuing rule '{other}'"
            ))),
        }
    }
}

/// Ticks of acceleration/deceleration a bus loses after pulling into a berth
pub const ENTRY_PENALTY_TICKS: u32 = 8;
