//! Per-session bookkeeping for the event session coordinator.

use std::collections::HashSet;

use crate::types::DbId;

/// Tracks which recipients were already mailed or alerted during one
/// logical user action.
///
/// Email and alert tracking are independent: being mailed never blocks an
/// alert and vice versa.
#[derive(Debug, Default)]
pub struct SessionLedger {
    emailed: HashSet<DbId>,
    alerted: HashSet<DbId>,
    frames: usize,
}

impl SessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the single instant email of this session for `recipient`.
    ///
    /// Returns `false` if the recipient was already mailed.
    pub fn claim_email(&mut self, recipient: DbId) -> bool {
        self.emailed.insert(recipient)
    }

    pub fn was_emailed(&self, recipient: DbId) -> bool {
        self.emailed.contains(&recipient)
    }

    pub fn claim_alert(&mut self, recipient: DbId) -> bool {
        self.alerted.insert(recipient)
    }

    pub fn was_alerted(&self, recipient: DbId) -> bool {
        self.alerted.contains(&recipient)
    }

    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn emailed_count(&self) -> usize {
        self.emailed.len()
    }

    pub fn alerted_count(&self) -> usize {
        self.alerted.len()
    }
}
