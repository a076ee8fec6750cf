/// Submission status audit trail
///
/// One append-only row per transition, including the initial `pending`
/// entry written when a submission is created. Writers run inside the
/// caller's transaction so an entry commits together with the status it
/// describes; rows are removed only together with their submission.
use crate::{
    error::{AppError, AppResult},
    submission::{SubmissionKind, SubmissionStatus},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

/// Recorded transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub id: i64,
    pub submission_type: SubmissionKind,
    pub submission_id: i64,
    pub previous_status: Option<SubmissionStatus>,
    pub new_status: SubmissionStatus,
    pub remark: Option<String>,
    pub organization_id: Option<i64>,
    pub acted_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Transition about to be recorded
#[derive(Debug, Clone)]
pub struct NewStatusLogEntry<'a> {
    pub submission_type: SubmissionKind,
    pub submission_id: i64,
    pub previous_status: Option<SubmissionStatus>,
    pub new_status: SubmissionStatus,
    pub remark: Option<&'a str>,
    pub organization_id: Option<i64>,
    pub acted_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Status log reader; writes go through the associated functions
#[derive(Clone)]
pub struct StatusLog {
    db: SqlitePool,
}

impl StatusLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append one entry on the caller's connection
    pub async fn append(conn: &mut SqliteConnection, entry: &NewStatusLogEntry<'_>) -> AppResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO submission_status_logs
            (submission_type, submission_id, previous_status, new_status, remark, organization_id, acted_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.submission_type.as_str())
        .bind(entry.submission_id)
        .bind(entry.previous_status.map(|s| s.as_str()))
        .bind(entry.new_status.as_str())
        .bind(entry.remark)
        .bind(entry.organization_id)
        .bind(entry.acted_by)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Remove every entry of one submission (submission deletion only)
    pub async fn delete_for(
        conn: &mut SqliteConnection,
        kind: SubmissionKind,
        submission_id: i64,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM submission_status_logs WHERE submission_type = ? AND submission_id = ?",
        )
        .bind(kind.as_str())
        .bind(submission_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Entries of one submission in the order they were written
    pub async fn history(&self, kind: SubmissionKind, submission_id: i64) -> AppResult<Vec<StatusLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, submission_type, submission_id, previous_status, new_status,
                   remark, organization_id, acted_by, created_at
            FROM submission_status_logs
            WHERE submission_type = ? AND submission_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(kind.as_str())
        .bind(submission_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_entry).collect()
    }
}

fn parse_entry(row: &SqliteRow) -> AppResult<StatusLogEntry> {
    let submission_type = SubmissionKind::from_str(&row.try_get::<String, _>("submission_type")?)?;
    let previous_status = row
        .try_get::<Option<String>, _>("previous_status")?
        .map(|s| SubmissionStatus::from_str(&s))
        .transpose()?;
    let new_status = SubmissionStatus::from_str(&row.try_get::<String, _>("new_status")?)?;

    Ok(StatusLogEntry {
        id: row.try_get("id")?,
        submission_type,
        submission_id: row.try_get("submission_id")?,
        previous_status,
        new_status,
        remark: row.try_get("remark")?,
        organization_id: row.try_get("organization_id")?,
        acted_by: row.try_get("acted_by")?,
        created_at: row.try_get("created_at")?,
    })
}

/// State reconstructed from a status log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedState {
    pub status: SubmissionStatus,
    pub verified_by: Option<i64>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Replay a log from its initial entry
///
/// Fails when the log is empty, does not start at creation, or is not a
/// linked chain (each `previous_status` equal to the prior `new_status`).
pub fn replay(entries: &[StatusLogEntry]) -> AppResult<ReplayedState> {
    let first = entries
        .first()
        .ok_or_else(|| AppError::Internal("Status log is empty".to_string()))?;

    if first.previous_status.is_some() || first.new_status != SubmissionStatus::Pending {
        return Err(AppError::Internal(format!(
            "Status log for {} {} does not start at creation",
            first.submission_type.as_str(),
            first.submission_id
        )));
    }

    let mut state = ReplayedState {
        status: SubmissionStatus::Pending,
        verified_by: None,
        verified_at: None,
    };

    for entry in &entries[1..] {
        if entry.previous_status != Some(state.status) {
            return Err(AppError::Internal(format!(
                "Status log entry {} breaks the chain",
                entry.id
            )));
        }

        state = match entry.new_status {
            SubmissionStatus::Pending => ReplayedState {
                status: SubmissionStatus::Pending,
                verified_by: None,
                verified_at: None,
            },
            status => ReplayedState {
                status,
                verified_by: Some(entry.acted_by),
                verified_at: Some(entry.created_at),
            },
        };
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry(
        id: i64,
        previous: Option<SubmissionStatus>,
        new: SubmissionStatus,
        acted_by: i64,
        minutes: i64,
    ) -> StatusLogEntry {
        StatusLogEntry {
            id,
            submission_type: SubmissionKind::Evaluation,
            submission_id: 1,
            previous_status: previous,
            new_status: new,
            remark: None,
            organization_id: None,
            acted_by,
            created_at: Utc.with_ymd_and_hms(2025, 5, 2, 9, 0, 0).unwrap() + Duration::minutes(minutes),
        }
    }

    #[test]
    fn test_replay_verified() {
        use SubmissionStatus::*;
        let log = vec![
            entry(1, None, Pending, 10, 0),
            entry(2, Some(Pending), Rejected, 20, 5),
            entry(3, Some(Rejected), Pending, 20, 6),
            entry(4, Some(Pending), Verified, 30, 9),
        ];

        let state = replay(&log).unwrap();
        assert_eq!(state.status, Verified);
        assert_eq!(state.verified_by, Some(30));
        assert_eq!(state.verified_at, Some(log[3].created_at));
    }

    #[test]
    fn test_replay_reopened_clears_verifier() {
        use SubmissionStatus::*;
        let log = vec![
            entry(1, None, Pending, 10, 0),
            entry(2, Some(Pending), Verified, 20, 5),
            entry(3, Some(Verified), Pending, 20, 7),
        ];

        let state = replay(&log).unwrap();
        assert_eq!(state.status, Pending);
        assert_eq!(state.verified_by, None);
        assert_eq!(state.verified_at, None);
    }

    #[test]
    fn test_replay_repeated_transition_keeps_chain() {
        use SubmissionStatus::*;
        let log = vec![
            entry(1, None, Pending, 10, 0),
            entry(2, Some(Pending), Verified, 20, 5),
            entry(3, Some(Verified), Verified, 21, 8),
        ];

        let state = replay(&log).unwrap();
        assert_eq!(state.verified_by, Some(21));
        assert_eq!(state.verified_at, Some(log[2].created_at));
    }

    #[test]
    fn test_replay_rejects_broken_chain() {
        use SubmissionStatus::*;
        let log = vec![
            entry(1, None, Pending, 10, 0),
            entry(2, Some(Verified), Rejected, 20, 5),
        ];
        assert!(replay(&log).is_err());
        assert!(replay(&[]).is_err());
        assert!(replay(&[entry(1, Some(Pending), Verified, 1, 0)]).is_err());
    }
}
