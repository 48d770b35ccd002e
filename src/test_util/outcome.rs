use std::sync::{Arc, Mutex};

use crate::probe::outcome::{OutcomeRecord, OutcomeSink};

/// Collects all Outcome Records in memory, in the order they were emitted
#[derive(Default, Clone)]
pub struct CollectingOutcomeSink {
    records: Arc<Mutex<Vec<OutcomeRecord>>>,
}
impl CollectingOutcomeSink {
    pub fn records(&self) -> Vec<OutcomeRecord> {
        self.records.lock()
            .expect("a test panicked while holding the lock")
            .clone()
    }
}

impl OutcomeSink for CollectingOutcomeSink {
    fn record(&self, record: &OutcomeRecord) {
        self.records.lock()
            .expect("a test panicked while holding the lock")
            .push(record.clone());
    }
}
