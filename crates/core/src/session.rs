//! Visit-level view over derived events.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::events::{seconds_between, DerivedEvent, Variation};

/// One visit of an assigned client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub visit_id: String,
    pub client_id: String,
    pub variation: Variation,
    /// First event time
    pub started_at: NaiveDateTime,
    /// Last event time
    pub last_active_at: NaiveDateTime,
    /// Event count in this visit
    pub event_count: u64,
    /// Sum of time_spent over the visit's events
    pub duration_secs: f64,
    pub reached_confirm: bool,
    pub backtrack_count: u64,
}

impl Session {
    /// Opens a session from its first event.
    pub fn start(first: &DerivedEvent) -> Self {
        Self {
            visit_id: first.visit_id().to_string(),
            client_id: first.client_id().to_string(),
            variation: first.variation(),
            started_at: first.event.date_time,
            last_active_at: first.event.date_time,
            event_count: 0,
            duration_secs: 0.0,
            reached_confirm: false,
            backtrack_count: 0,
        }
    }

    /// Folds the next event of the same visit into the session.
    pub fn record_event(&mut self, event: &DerivedEvent) {
        self.event_count += 1;
        self.duration_secs += event.time_spent;
        self.reached_confirm |= event.process_step().is_confirm();
        if event.is_back_track {
            self.backtrack_count += 1;
        }
        if event.event.date_time > self.last_active_at {
            self.last_active_at = event.event.date_time;
        }
        if event.event.date_time < self.started_at {
            self.started_at = event.event.date_time;
        }
    }

    /// Wall-clock span between the first and last event, in seconds.
    pub fn span_secs(&self) -> f64 {
        seconds_between(self.started_at, self.last_active_at)
    }

    pub fn has_backtrack(&self) -> bool {
        self.backtrack_count > 0
    }
}
