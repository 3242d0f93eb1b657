//! Funnel event types: experiment arms, process steps, and per-event rows.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Experiment arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variation {
    /// Old UI
    Control,
    /// New UI
    Test,
}

impl Variation {
    /// Both arms, control first.
    pub const ALL: [Variation; 2] = [Variation::Control, Variation::Test];

    /// Returns the label as it appears in the assignment file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "Control",
            Self::Test => "Test",
        }
    }

    /// Parses an optional assignment cell.
    ///
    /// An empty cell is a missing assignment, not an error.
    pub fn parse_optional(raw: &str) -> Result<Option<Self>, Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }
}

impl fmt::Display for Variation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Control" => Ok(Self::Control),
            "Test" => Ok(Self::Test),
            other => Err(Error::InvalidVariation(other.to_string())),
        }
    }
}

/// One of the five ordered funnel stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProcessStep {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "step_1")]
    Step1,
    #[serde(rename = "step_2")]
    Step2,
    #[serde(rename = "step_3")]
    Step3,
    #[serde(rename = "confirm")]
    Confirm,
}

impl ProcessStep {
    /// All steps in funnel order.
    pub const ORDERED: [ProcessStep; 5] = [
        ProcessStep::Start,
        ProcessStep::Step1,
        ProcessStep::Step2,
        ProcessStep::Step3,
        ProcessStep::Confirm,
    ];

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Step1 => "step_1",
            Self::Step2 => "step_2",
            Self::Step3 => "step_3",
            Self::Confirm => "confirm",
        }
    }

    /// Rank of the step in the funnel (start = 0, confirm = 4).
    pub fn index(&self) -> u8 {
        match self {
            Self::Start => 0,
            Self::Step1 => 1,
            Self::Step2 => 2,
            Self::Step3 => 3,
            Self::Confirm => 4,
        }
    }

    pub fn is_confirm(&self) -> bool {
        matches!(self, Self::Confirm)
    }
}

impl fmt::Display for ProcessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessStep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" => Ok(Self::Start),
            "step_1" => Ok(Self::Step1),
            "step_2" => Ok(Self::Step2),
            "step_3" => Ok(Self::Step3),
            "confirm" => Ok(Self::Confirm),
            other => Err(Error::UnknownStep(other.to_string())),
        }
    }
}

/// A single funnel event of an assigned client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub client_id: String,
    pub visit_id: String,
    pub process_step: ProcessStep,
    pub date_time: NaiveDateTime,
    #[serde(rename = "Variation")]
    pub variation: Variation,
    /// Position of the merged record this event came from
    pub source_index: usize,
}

/// An event with the quantities derived from its place in the visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedEvent {
    #[serde(flatten)]
    pub event: EventRow,
    pub step_index: u8,
    /// Step rank of the previous event in the same visit
    pub prev_step_index: Option<u8>,
    pub is_back_track: bool,
    /// Seconds since the previous event in the same visit
    pub time_spent: f64,
}

/// Signed gap between two timestamps in seconds, keeping sub-second parts.
pub fn seconds_between(earlier: NaiveDateTime, later: NaiveDateTime) -> f64 {
    let delta = later - earlier;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

impl DerivedEvent {
    pub fn visit_id(&self) -> &str {
        &self.event.visit_id
    }

    pub fn client_id(&self) -> &str {
        &self.event.client_id
    }

    pub fn variation(&self) -> Variation {
        self.event.variation
    }

    pub fn process_step(&self) -> ProcessStep {
        self.event.process_step
    }
}
