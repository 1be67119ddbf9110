//! Bus Corridor Simulation Library
//!
//! A tick-driven simulation of buses queuing, berthing and exchanging
//! passengers at the stops of a transit corridor.

pub mod simulation;
