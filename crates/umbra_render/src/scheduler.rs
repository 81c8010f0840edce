//! Shadow Update Scheduler
//!
//! Limits how many shadow sources may be re-rendered per frame. Slots are
//! handed out first-come, first-served after [`UpdateScheduler::reset`] at
//! the start of each frame's scheduling pass. Demand above the budget is not
//! queued here: a source that misses the budget keeps its dirty flag and
//! competes again next frame.

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Default number of shadow sources re-rendered per frame
pub const DEFAULT_MAX_UPDATES: usize = 10;

fn warn_if_disabled(max_updates: usize) {
    if max_updates == 0 {
        log::warn!(
            target: "umbra::shadows",
            "Shadow update budget set to 0, shadow maps will no longer be updated"
        );
    }
}

/// Per-frame shadow update budget
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateScheduler {
    max_updates: usize,
    claimed: Vec<usize>,
}

impl UpdateScheduler {
    /// Create a scheduler allowing `max_updates` re-renders per frame
    pub fn new(max_updates: usize) -> Self {
        warn_if_disabled(max_updates);
        Self {
            max_updates,
            claimed: Vec::with_capacity(max_updates),
        }
    }

    /// Start a new frame, releasing every claimed slot
    pub fn reset(&mut self) {
        self.claimed.clear();
    }

    /// Claim an update slot for the shadow source in `source_slot`
    pub fn claim(&mut self, source_slot: usize) -> Result<(), SchedulerError> {
        if self.remaining() == 0 {
            return Err(SchedulerError::BudgetExhausted);
        }
        if self.claimed.contains(&source_slot) {
            return Err(SchedulerError::AlreadyClaimed(source_slot));
        }
        self.claimed.push(source_slot);
        Ok(())
    }

    /// Update slots still available this frame
    pub fn remaining(&self) -> usize {
        self.max_updates.saturating_sub(self.claimed.len())
    }

    /// Source slots claimed this frame, in claim order
    pub fn claimed(&self) -> &[usize] {
        &self.claimed
    }

    /// Budget per frame
    pub fn max_updates(&self) -> usize {
        self.max_updates
    }

    /// Change the per-frame budget (takes effect immediately)
    pub fn set_max_updates(&mut self, max_updates: usize) {
        warn_if_disabled(max_updates);
        self.max_updates = max_updates;
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPDATES)
    }
}
