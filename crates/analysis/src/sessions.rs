//! Session reconstruction.
//!
//! Orders each visit's events by time and derives, per event, the step rank,
//! the previous step rank, whether the client moved backwards, and the
//! seconds since the previous event.

use std::collections::HashMap;
use std::time::Instant;

use experiment_core::{seconds_between, DerivedEvent, EventRow, MergedRecord, Session};
use telemetry::metrics;
use tracing::{info, warn};

/// Derived events plus what reconstruction skipped or repaired.
#[derive(Debug, Clone, Default)]
pub struct Reconstruction {
    /// Sorted by (visit_id, date_time), ties in merge order
    pub events: Vec<DerivedEvent>,
    /// Merged records with no web activity
    pub records_without_activity: u64,
    /// Negative gaps clamped to zero
    pub negative_durations: u64,
}

/// Builds derived events from the merged records.
pub fn reconstruct(records: &[MergedRecord]) -> Reconstruction {
    let started = Instant::now();

    let events: Vec<EventRow> = records
        .iter()
        .enumerate()
        .filter_map(|(i, record)| record.to_event(i))
        .collect();
    let records_without_activity = (records.len() - events.len()) as u64;

    let (events, negative_durations) = derive_events(events);

    let m = metrics();
    m.events_derived.inc_by(events.len() as u64);
    m.negative_durations.inc_by(negative_durations);
    m.reconstruction_latency_ms.observe_since(started);
    info!(
        events = events.len(),
        skipped = records_without_activity,
        "Reconstructed sessions"
    );

    Reconstruction {
        events,
        records_without_activity,
        negative_durations,
    }
}

/// Sorts events per visit and attaches the derived columns.
///
/// Returns the derived events and the number of negative gaps that were
/// clamped to zero.
pub fn derive_events(mut events: Vec<EventRow>) -> (Vec<DerivedEvent>, u64) {
    // Stable: equal timestamps keep merge order.
    events.sort_by(|a, b| {
        a.visit_id
            .cmp(&b.visit_id)
            .then_with(|| a.date_time.cmp(&b.date_time))
    });

    let mut derived: Vec<DerivedEvent> = Vec::with_capacity(events.len());
    let mut negative = 0u64;

    for event in events {
        let step_index = event.process_step.index();
        let previous = derived
            .last()
            .filter(|prev| prev.visit_id() == event.visit_id.as_str());

        let (prev_step_index, time_spent) = match previous {
            Some(prev) => {
                let gap = seconds_between(prev.event.date_time, event.date_time);
                if gap < 0.0 {
                    negative += 1;
                }
                (Some(prev.step_index), gap.max(0.0))
            }
            None => (None, 0.0),
        };

        derived.push(DerivedEvent {
            event,
            step_index,
            prev_step_index,
            is_back_track: prev_step_index.is_some_and(|prev| prev > step_index),
            time_spent,
        });
    }

    if negative > 0 {
        warn!(count = negative, "Negative time gaps clamped to zero");
    }

    (derived, negative)
}

/// Groups derived events by visit, in order of first appearance.
pub fn sessions(events: &[DerivedEvent]) -> Vec<Session> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut sessions: Vec<Session> = Vec::new();

    for event in events {
        let slot = *index.entry(event.visit_id()).or_insert_with(|| {
            sessions.push(Session::start(event));
            sessions.len() - 1
        });
        sessions[slot].record_event(event);
    }

    metrics().sessions_reconstructed.inc_by(sessions.len() as u64);
    sessions
}
