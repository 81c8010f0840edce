//! SlotPool - Fixed-capacity slot table
//!
//! Maps a small integer slot to an owned handle. Slots are handed out
//! lowest-first, either one at a time or as a consecutive run, so that the
//! GPU-side tables they index stay dense at the front.
//!
//! Allocation is two-phase: [`SlotPool::allocate`] marks a slot as taken and
//! returns it, [`SlotPool::reserve`] stores the handle. A slot that has been
//! allocated but not yet reserved is never handed out twice.

use alloc::vec::Vec;

use crate::bitset::BitSet;
use crate::error::PoolError;

/// Fixed-capacity slot table with `N` slots
pub struct SlotPool<T, const N: usize> {
    entries: Vec<Option<T>>,
    used: BitSet,
    max_index: Option<usize>,
    len: usize,
}

impl<T, const N: usize> SlotPool<T, N> {
    /// Number of slots in the pool
    pub const CAPACITY: usize = N;

    /// Create an empty pool
    pub fn new() -> Self {
        let mut entries = Vec::with_capacity(N);
        entries.resize_with(N, || None);
        Self {
            entries,
            used: BitSet::new(N),
            max_index: None,
            len: 0,
        }
    }

    fn check_range(slot: usize) -> Result<(), PoolError> {
        if slot >= N {
            return Err(PoolError::OutOfRange(slot));
        }
        Ok(())
    }

    fn mark_used(&mut self, slot: usize, count: usize) {
        self.used.set_range(slot, count);
        self.len += count;
        let last = slot + count - 1;
        self.max_index = Some(self.max_index.map_or(last, |max| max.max(last)));
    }

    /// Take the lowest free slot
    pub fn allocate(&mut self) -> Result<usize, PoolError> {
        let slot = self.used.first_clear().ok_or(PoolError::CapacityExceeded)?;
        self.mark_used(slot, 1);
        Ok(slot)
    }

    /// Take the lowest run of `count` free slots, returning its first slot
    pub fn allocate_consecutive(&mut self, count: usize) -> Result<usize, PoolError> {
        match count {
            0 => Err(PoolError::InvalidCount),
            1 => self.allocate(),
            _ => {
                let slot = self
                    .used
                    .first_clear_run(count)
                    .ok_or(PoolError::CapacityExceeded)?;
                self.mark_used(slot, count);
                Ok(slot)
            }
        }
    }

    /// Store a handle in a slot
    ///
    /// The slot may come from [`allocate`](Self::allocate) or be a free slot
    /// chosen by the caller. Fails if a handle is already stored there.
    pub fn reserve(&mut self, slot: usize, handle: T) -> Result<(), PoolError> {
        Self::check_range(slot)?;
        if self.entries[slot].is_some() {
            return Err(PoolError::Occupied(slot));
        }
        if !self.used.get(slot) {
            self.mark_used(slot, 1);
        }
        self.entries[slot] = Some(handle);
        Ok(())
    }

    /// Release a slot, returning the handle it held (if one was reserved)
    pub fn free(&mut self, slot: usize) -> Result<Option<T>, PoolError> {
        Self::check_range(slot)?;
        if !self.used.get(slot) {
            return Err(PoolError::Vacant(slot));
        }
        self.used.clear(slot);
        self.len -= 1;
        let handle = self.entries[slot].take();
        if self.max_index == Some(slot) {
            self.rescan_max(slot);
        }
        Ok(handle)
    }

    /// Release `count` consecutive slots starting at `slot`
    ///
    /// Nothing is released unless every slot in the range is in use.
    pub fn free_range(&mut self, slot: usize, count: usize) -> Result<Vec<T>, PoolError> {
        if count == 0 {
            return Err(PoolError::InvalidCount);
        }
        let end = slot
            .checked_add(count)
            .filter(|&end| end <= N)
            .ok_or(PoolError::OutOfRange(slot))?;
        if let Some(vacant) = (slot..end).find(|&s| !self.used.get(s)) {
            return Err(PoolError::Vacant(vacant));
        }

        self.used.clear_range(slot, count);
        self.len -= count;
        let handles = self.entries[slot..end]
            .iter_mut()
            .filter_map(Option::take)
            .collect();

        if self.max_index.is_some_and(|max| max < end && max >= slot) {
            self.rescan_max(end - 1);
        }
        Ok(handles)
    }

    fn rescan_max(&mut self, from: usize) {
        self.max_index = self.used.prev_set(from);
    }

    /// Get the handle stored in a slot
    pub fn get(&self, slot: usize) -> Option<&T> {
        self.entries.get(slot)?.as_ref()
    }

    /// Get the handle stored in a slot mutably
    pub fn get_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.entries.get_mut(slot)?.as_mut()
    }

    /// Check if a slot is taken (allocated or reserved)
    pub fn is_used(&self, slot: usize) -> bool {
        slot < N && self.used.get(slot)
    }

    /// Highest slot in use, `None` when the pool is empty
    ///
    /// Every slot above this index is guaranteed to be free.
    pub fn max_index(&self) -> Option<usize> {
        self.max_index
    }

    /// Number of slots in use
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no slot is in use
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of free slots
    pub fn remaining(&self) -> usize {
        N - self.len
    }

    fn live_range(&self) -> usize {
        self.max_index.map_or(0, |max| max + 1)
    }

    /// Iterate over reserved slots and their handles, in slot order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries[..self.live_range()]
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.as_ref().map(|handle| (slot, handle)))
    }

    /// Iterate over reserved slots and their handles mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        let live = self.live_range();
        self.entries[..live]
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, entry)| entry.as_mut().map(|handle| (slot, handle)))
    }

    /// Release every slot
    pub fn clear(&mut self) {
        let live = self.live_range();
        self.entries[..live].iter_mut().for_each(|entry| *entry = None);
        self.used.clear_all();
        self.max_index = None;
        self.len = 0;
    }
}

impl<T, const N: usize> Default for SlotPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> core::fmt::Debug for SlotPool<T, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SlotPool(capacity={}, used={}, max_index={:?})", N, self.len, self.max_index)
    }
}
