//! Errors raised by the simulation core

use thiserror::Error;

use super::types::{BusId, LinkId, StopId};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// A demand queue, group map or allocation plan was asked about a key it was never configured with
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("bus {0:?} is not in the fleet")]
    UnknownBus(BusId),

    #[error("stop {0:?} does not exist")]
    UnknownStop(StopId),

    #[error("link {0:?} does not exist")]
    UnknownLink(LinkId),
}
