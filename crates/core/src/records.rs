//! Source rows and the merged experiment record.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::events::{EventRow, ProcessStep, Variation};

/// Client demographics row (`df_final_demo`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Demographics {
    #[validate(length(min = 1, max = 64))]
    pub client_id: String,
    /// Tenure, whole years
    #[validate(range(min = 0.0))]
    pub clnt_tenure_yr: Option<f64>,
    /// Tenure, total months
    #[validate(range(min = 0.0))]
    pub clnt_tenure_mnth: Option<f64>,
    #[validate(range(min = 0.0, max = 130.0))]
    pub clnt_age: Option<f64>,
    /// Gender code (M, F, U, X)
    pub gendr: Option<String>,
    #[validate(range(min = 0.0))]
    pub num_accts: Option<f64>,
    /// Total balance
    pub bal: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub calls_6_mnth: Option<f64>,
    #[validate(range(min = 0.0))]
    pub logons_6_mnth: Option<f64>,
}

/// Raw web-log row (`df_final_web_data_pt_*`), before step and timestamp parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWebEvent {
    pub client_id: String,
    #[serde(default)]
    pub visit_visitor_id: Option<String>,
    pub visit_id: String,
    pub process_step: String,
    pub date_time: String,
}

/// Raw experiment assignment row (`df_final_experiment_clients`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAssignment {
    pub client_id: String,
    #[serde(rename = "Variation", default)]
    pub variation: Option<String>,
}

/// One parsed page-step hit inside a visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebActivity {
    pub visit_visitor_id: Option<String>,
    pub visit_id: String,
    pub process_step: ProcessStep,
    pub date_time: NaiveDateTime,
}

/// A parsed web-log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebEvent {
    pub client_id: String,
    #[serde(flatten)]
    pub activity: WebActivity,
}

/// A parsed assignment; `None` when the cell was empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub client_id: String,
    pub variation: Option<Variation>,
}

/// Tenure segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClientStatus {
    New,
    #[serde(rename = "Long-standing")]
    LongStanding,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::LongStanding => "Long-standing",
        }
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Age segment relative to the median client age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeGroup {
    Younger,
    Older,
}

impl AgeGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Younger => "Younger",
            Self::Older => "Older",
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Demographics plus derived segment columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProfile {
    #[serde(flatten)]
    pub demographics: Demographics,
    pub total_tenure_months: Option<f64>,
    pub client_status: Option<ClientStatus>,
    pub age_group: Option<AgeGroup>,
}

impl ClientProfile {
    /// Derives the segment columns.
    ///
    /// `median_age` is the median over all clients with a known age; a client
    /// without an age gets no age group.
    pub fn derive(
        demographics: Demographics,
        median_age: Option<f64>,
        new_client_max_tenure_months: f64,
    ) -> Self {
        let total_tenure_months = match (demographics.clnt_tenure_yr, demographics.clnt_tenure_mnth) {
            (Some(years), Some(months)) => Some(years * 12.0 + months),
            _ => None,
        };

        let client_status = total_tenure_months.map(|total| {
            if total <= new_client_max_tenure_months {
                ClientStatus::New
            } else {
                ClientStatus::LongStanding
            }
        });

        let age_group = match (demographics.clnt_age, median_age) {
            (Some(age), Some(median)) if age <= median => Some(AgeGroup::Younger),
            (Some(_), Some(_)) => Some(AgeGroup::Older),
            _ => None,
        };

        Self {
            demographics,
            total_tenure_months,
            client_status,
            age_group,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.demographics.client_id
    }
}

/// One row of the merged experiment dataset.
///
/// `activity` is `None` for assigned clients that never entered the flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub profile: ClientProfile,
    pub activity: Option<WebActivity>,
    pub variation: Variation,
}

impl MergedRecord {
    pub fn client_id(&self) -> &str {
        self.profile.client_id()
    }

    pub fn visit_id(&self) -> Option<&str> {
        self.activity.as_ref().map(|a| a.visit_id.as_str())
    }

    /// Projects this record onto a funnel event.
    pub fn to_event(&self, source_index: usize) -> Option<EventRow> {
        let activity = self.activity.as_ref()?;
        Some(EventRow {
            client_id: self.client_id().to_string(),
            visit_id: activity.visit_id.clone(),
            process_step: activity.process_step,
            date_time: activity.date_time,
            variation: self.variation,
            source_index,
        })
    }
}
