//! Sequence-number remapping for replays.
//!
//! One counter runs across a whole batch so replayed records never collide
//! with sequence numbers already in the dialog. The first time an original
//! value appears within a script it takes the next counter value; later
//! occurrences in the same script (own `genseq` or a `calling_genseq`
//! back-reference) reuse it.

use crate::record::ReplayRecord;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SeqRemapper {
    next: u64,
    assigned: HashMap<u64, u64>,
}

impl SeqRemapper {
    pub fn new(seed: u64) -> Self {
        Self {
            next: seed,
            assigned: HashMap::new(),
        }
    }

    /// Counter seeded one past the dialog's current maximum.
    pub fn after(max_existing: u64) -> Self {
        Self::new(max_existing.saturating_add(1))
    }

    pub fn remap(&mut self, original: u64) -> u64 {
        if let Some(assigned) = self.assigned.get(&original) {
            return *assigned;
        }
        let assigned = self.next;
        self.next = self.next.saturating_add(1);
        self.assigned.insert(original, assigned);
        assigned
    }

    /// Starts a new script: the counter carries on, the value map does not.
    pub fn begin_script(&mut self) {
        self.assigned.clear();
    }

    /// Remaps one script's records in order. The input is left untouched.
    pub fn remap_script(&mut self, records: &[ReplayRecord]) -> Vec<ReplayRecord> {
        self.begin_script();
        records
            .iter()
            .map(|record| {
                let mut record = record.clone();
                if let Some(slot) = record.body.sequence_number_mut() {
                    *slot = self.remap(*slot);
                }
                record
            })
            .collect()
    }
}
