/// Dashboard figures
///
/// Counts per submission kind within the caller's scope. Reports are left
/// out entirely for roles that only track evaluations.
use crate::{
    admin::Administrator,
    error::AppResult,
    scope::{Scope, ScopeColumns},
    submission::SubmissionKind,
};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindSummary {
    pub total: i64,
    pub pending: i64,
    pub verified: i64,
    pub rejected: i64,
    pub late: i64,
    /// Evaluations only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub report_year: Option<i32>,
    pub evaluations: KindSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports: Option<KindSummary>,
}

#[derive(Clone)]
pub struct Dashboard {
    db: SqlitePool,
}

impl Dashboard {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn summary(&self, admin: &Administrator, report_year: Option<i32>) -> AppResult<DashboardSummary> {
        let evaluations = match Scope::for_dashboard(admin, SubmissionKind::Evaluation) {
            Some(scope) => self.summarize(SubmissionKind::Evaluation, scope, report_year).await?,
            None => KindSummary::default(),
        };

        let reports = match Scope::for_dashboard(admin, SubmissionKind::Report) {
            Some(scope) => Some(self.summarize(SubmissionKind::Report, scope, report_year).await?),
            None => None,
        };

        Ok(DashboardSummary {
            report_year,
            evaluations,
            reports,
        })
    }

    async fn summarize(
        &self,
        kind: SubmissionKind,
        scope: Scope,
        report_year: Option<i32>,
    ) -> AppResult<KindSummary> {
        let average = match kind {
            SubmissionKind::Evaluation => "AVG(s.score)",
            SubmissionKind::Report => "NULL",
        };

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN s.status = 'pending' THEN 1 ELSE 0 END), 0) AS pending, \
             COALESCE(SUM(CASE WHEN s.status = 'verified' THEN 1 ELSE 0 END), 0) AS verified, \
             COALESCE(SUM(CASE WHEN s.status = 'rejected' THEN 1 ELSE 0 END), 0) AS rejected, \
             COALESCE(SUM(s.is_late), 0) AS late, \
             {} AS average_score \
             FROM {} s LEFT JOIN organizations o ON o.id = s.organization_id WHERE 1 = 1",
            average,
            kind.table()
        ));
        scope.push_filter(&mut qb, ScopeColumns::default());
        if let Some(year) = report_year {
            qb.push(" AND s.report_year = ");
            qb.push_bind(year);
        }

        let row = qb.build().fetch_one(&self.db).await?;

        Ok(KindSummary {
            total: row.try_get("total")?,
            pending: row.try_get("pending")?,
            verified: row.try_get("verified")?,
            rejected: row.try_get("rejected")?,
            late: row.try_get("late")?,
            average_score: row.try_get("average_score")?,
        })
    }
}
