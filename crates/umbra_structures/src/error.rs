//! Error types for slot pools

use core::fmt;

/// Slot pool error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// No free slot (or no free run of the requested length) remains
    CapacityExceeded,
    /// The slot already holds a handle
    Occupied(usize),
    /// The slot is not in use
    Vacant(usize),
    /// The slot index lies outside the pool
    OutOfRange(usize),
    /// A consecutive allocation of zero slots was requested
    InvalidCount,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::CapacityExceeded => write!(f, "Slot pool capacity exceeded"),
            PoolError::Occupied(slot) => write!(f, "Slot {} is already occupied", slot),
            PoolError::Vacant(slot) => write!(f, "Slot {} is not in use", slot),
            PoolError::OutOfRange(slot) => write!(f, "Slot {} is out of range", slot),
            PoolError::InvalidCount => write!(f, "Cannot allocate zero consecutive slots"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PoolError {}
