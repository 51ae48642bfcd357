//! Event API DTOs
use serde::Serialize;

use crate::domain::rollout::rollout_controller::TriggerOutcome;

/// Response body of `POST /event`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Push events decoded from the notification
    pub events: usize,
    pub dispatched: usize,
    pub coalesced: usize,
    pub rejected: usize,
}

impl DispatchSummary {
    pub fn new(events: usize) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: TriggerOutcome) {
        match outcome {
            TriggerOutcome::Dispatched => self.dispatched += 1,
            TriggerOutcome::Coalesced => self.coalesced += 1,
            TriggerOutcome::Rejected => self.rejected += 1,
        }
    }
}
