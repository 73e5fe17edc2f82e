use std::sync::Mutex;

use vmprov::provision::{ProgressSink, ProvisioningOutcome};
use vmprov::session::StatusUpdate;

/// Progress sink that remembers everything it was given.
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<StatusUpdate>>,
    outcomes: Mutex<Vec<ProvisioningOutcome>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn percentages(&self) -> Vec<u8> {
        self.updates().iter().map(|u| u.percent_complete).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.updates().into_iter().map(|u| u.message).collect()
    }

    /// Number of `finish` calls seen.
    pub fn finish_count(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }

    pub fn outcome(&self) -> Option<ProvisioningOutcome> {
        self.outcomes.lock().unwrap().last().cloned()
    }
}

impl ProgressSink for RecordingSink {
    fn report(&self, update: &StatusUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }

    fn finish(&self, outcome: &ProvisioningOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}
