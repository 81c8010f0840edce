//! # umbra_structures - Slot Allocation Structures
//!
//! Fixed-capacity data structures used by the light registry:
//! - BitSet: Word-packed occupancy bits with first-fit searches
//! - SlotPool: Lowest-first slot table with consecutive-run allocation

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod bitset;
pub mod error;
pub mod slot_pool;

pub use bitset::BitSet;
pub use error::PoolError;
pub use slot_pool::SlotPool;

pub mod prelude {
    pub use crate::bitset::BitSet;
    pub use crate::error::PoolError;
    pub use crate::slot_pool::SlotPool;
}
