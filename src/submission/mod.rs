/// Submission lifecycle
///
/// Evaluations and activity reports share one header shape and one
/// pending → verified/rejected workflow; they differ only in their child
/// rows (answers vs. sections) and in the evaluation score.

pub mod code;
pub mod evaluation;
pub mod period;
pub mod report;
pub mod score;
pub mod workflow;

pub use evaluation::{Evaluation, EvaluationAnswer, EvaluationManager, NewAnswer, NewEvaluation};
pub use period::{PeriodManager, ReportingPeriod};
pub use report::{NewReport, NewSection, Report, ReportManager, ReportSection};
pub use workflow::SubmissionWorkflow;

use crate::{
    admin::RegionAssignment,
    error::{AppError, AppResult},
    scope::ScopedRecord,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Submission variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionKind {
    Evaluation,
    Report,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::Evaluation => "evaluation",
            SubmissionKind::Report => "report",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "evaluation" => Ok(SubmissionKind::Evaluation),
            "report" => Ok(SubmissionKind::Report),
            _ => Err(AppError::Validation(format!("Invalid submission type: {}", s))),
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            SubmissionKind::Evaluation => "evaluations",
            SubmissionKind::Report => "reports",
        }
    }

    /// Child table and its foreign key column
    pub(crate) fn children(&self) -> (&'static str, &'static str) {
        match self {
            SubmissionKind::Evaluation => ("evaluation_answers", "evaluation_id"),
            SubmissionKind::Report => ("report_sections", "report_id"),
        }
    }
}

/// Workflow states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Verified,
    Rejected,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 3] = [
        SubmissionStatus::Pending,
        SubmissionStatus::Verified,
        SubmissionStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Verified => "verified",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SubmissionStatus::Pending),
            "verified" => Ok(SubmissionStatus::Verified),
            "rejected" => Ok(SubmissionStatus::Rejected),
            _ => Err(AppError::Validation(format!("Invalid status: {}", s))),
        }
    }

    /// Verified and rejected carry a verifier stamp
    pub fn is_decision(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }
}

/// Fields shared by both submission kinds
///
/// `organization_name` and `organization_level` are a snapshot taken at
/// submission time and are authoritative for display; `organization_id`
/// is the live link used for scoping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionHeader {
    pub id: i64,
    pub kind: SubmissionKind,
    pub code: String,
    pub organization_name: String,
    pub organization_level: String,
    pub organization_id: Option<i64>,
    #[serde(skip)]
    pub organization_region_id: Option<i64>,
    #[serde(flatten)]
    pub region: RegionAssignment,
    pub report_year: i32,
    pub status: SubmissionStatus,
    pub verified_by: Option<i64>,
    pub verified_at: Option<DateTime<Utc>>,
    pub submitted_by: i64,
    pub submitted_at: DateTime<Utc>,
    pub is_late: bool,
    pub remark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ScopedRecord for SubmissionHeader {
    fn region(&self) -> &RegionAssignment {
        &self.region
    }

    fn organization_id(&self) -> Option<i64> {
        self.organization_id
    }

    fn organization_region_id(&self) -> Option<i64> {
        self.organization_region_id
    }
}

/// Status change request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StatusUpdateRequest {
    pub status: SubmissionStatus,
    /// Stored on the log entry only
    #[validate(length(max = 2000))]
    pub remark: Option<String>,
}

/// Deserialize a string with surrounding whitespace removed
///
/// Snapshot names are trimmed before their length rules run, so a blank
/// name fails validation instead of being stored empty.
pub(crate) fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(value.trim().to_string())
}

/// Listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionFilter {
    pub status: Option<SubmissionStatus>,
    pub report_year: Option<i32>,
    /// Matches the code or the organization snapshot name
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl SubmissionFilter {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(20).clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() as i64 - 1) * self.per_page() as i64
    }
}

/// One page of a scoped listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_rejection() {
        for status in SubmissionStatus::ALL {
            assert_eq!(SubmissionStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(matches!(
            SubmissionStatus::from_str("archived"),
            Err(AppError::Validation(_))
        ));
        assert!(SubmissionStatus::Verified.is_decision());
        assert!(!SubmissionStatus::Pending.is_decision());
    }

    #[test]
    fn test_filter_paging_bounds() {
        let filter = SubmissionFilter {
            page: Some(0),
            per_page: Some(500),
            ..Default::default()
        };
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.per_page(), SubmissionFilter::MAX_PER_PAGE);
        assert_eq!(filter.offset(), 0);

        let filter = SubmissionFilter {
            page: Some(3),
            per_page: Some(10),
            ..Default::default()
        };
        assert_eq!(filter.offset(), 20);
    }
}
