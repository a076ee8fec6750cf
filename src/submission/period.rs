/// Reporting period and submission deadline
///
/// A single active row holds the current reporting year and its deadline.
/// Lateness is decided once, when a submission is stored, so moving the
/// deadline later never relabels earlier submissions.
use crate::{
    db,
    error::{AppError, AppResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub id: i64,
    pub report_year: i32,
    pub deadline: DateTime<Utc>,
    pub is_active: bool,
    pub updated_by: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl ReportingPeriod {
    pub fn is_late(&self, submitted_at: DateTime<Utc>) -> bool {
        submitted_at > self.deadline
    }
}

/// Reporting period manager
#[derive(Clone)]
pub struct PeriodManager {
    db: SqlitePool,
}

impl PeriodManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// The active period, if one was configured
    pub async fn active(&self) -> AppResult<Option<ReportingPeriod>> {
        let mut conn = self.db.acquire().await?;
        Self::active_on(&mut conn).await
    }

    pub async fn active_on(conn: &mut SqliteConnection) -> AppResult<Option<ReportingPeriod>> {
        let row = sqlx::query(
            r#"
            SELECT id, report_year, deadline, is_active, updated_by, updated_at
            FROM reporting_periods
            WHERE is_active = 1
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(parse_period).transpose()
    }

    /// Period governing `report_year`, preferring the active row
    pub async fn for_year(conn: &mut SqliteConnection, report_year: i32) -> AppResult<Option<ReportingPeriod>> {
        let row = sqlx::query(
            r#"
            SELECT id, report_year, deadline, is_active, updated_by, updated_at
            FROM reporting_periods
            WHERE report_year = ?
            ORDER BY is_active DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(report_year)
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(parse_period).transpose()
    }

    /// Replace the active period
    pub async fn set_active(
        &self,
        report_year: i32,
        deadline: DateTime<Utc>,
        updated_by: i64,
        now: DateTime<Utc>,
    ) -> AppResult<ReportingPeriod> {
        if !(2000..=2100).contains(&report_year) {
            return Err(AppError::Validation(format!(
                "Report year out of range: {}",
                report_year
            )));
        }

        let mut tx = db::begin_write(&self.db).await?;

        sqlx::query("UPDATE reporting_periods SET is_active = 0 WHERE is_active = 1")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO reporting_periods (report_year, deadline, is_active, updated_by, updated_at)
            VALUES (?, ?, 1, ?, ?)
            "#,
        )
        .bind(report_year)
        .bind(deadline)
        .bind(updated_by)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Reporting period set to {} (deadline {}) by account {}",
            report_year,
            deadline,
            updated_by
        );

        Ok(ReportingPeriod {
            id: result.last_insert_rowid(),
            report_year,
            deadline,
            is_active: true,
            updated_by: Some(updated_by),
            updated_at: now,
        })
    }
}

fn parse_period(row: &SqliteRow) -> AppResult<ReportingPeriod> {
    Ok(ReportingPeriod {
        id: row.try_get("id")?,
        report_year: row.try_get("report_year")?,
        deadline: row.try_get("deadline")?,
        is_active: row.try_get("is_active")?,
        updated_by: row.try_get("updated_by")?,
        updated_at: row.try_get("updated_at")?,
    })
}
