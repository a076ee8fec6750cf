/// Submission state machine
///
/// Creation, status transitions and deletion for both submission kinds.
/// Each operation is one SQLite transaction: the submission row, its child
/// rows and its status log entries commit together or not at all.
use super::{
    code::CodeGenerator,
    period::PeriodManager,
    score::{categorize, load_categories},
    Page, SubmissionFilter, SubmissionHeader, SubmissionKind, SubmissionStatus,
};
use crate::{
    admin::{Administrator, RegionAssignment},
    audit::{NewStatusLogEntry, StatusLog, StatusLogEntry},
    clock::Clock,
    config::SubmissionConfig,
    db,
    error::{AppError, AppResult},
    metrics,
    scope::{Scope, ScopeColumns},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Compare-and-set retries before a concurrent transition is reported
const MAX_TRANSITION_ATTEMPTS: u32 = 3;

/// Kind-specific rows written in the creating transaction
#[async_trait]
pub trait ChildRows: Send + Sync {
    async fn insert(&self, conn: &mut SqliteConnection, submission_id: i64) -> AppResult<()>;
}

/// Header fields supplied by the submitter
#[derive(Debug, Clone)]
pub struct HeaderDraft<'a> {
    pub organization_name: &'a str,
    pub organization_level: &'a str,
    pub organization_id: Option<i64>,
    pub region: RegionAssignment,
    /// Defaults to the active reporting year
    pub report_year: Option<i32>,
    pub remark: Option<&'a str>,
    /// Evaluations only
    pub score: Option<i64>,
}

/// Values resolved inside the creating transaction
struct ResolvedHeader<'a> {
    draft: HeaderDraft<'a>,
    organization_id: Option<i64>,
    region: RegionAssignment,
    report_year: i32,
    submitted_by: i64,
    submitted_at: DateTime<Utc>,
    is_late: bool,
    category: Option<String>,
}

#[derive(Clone)]
pub struct SubmissionWorkflow {
    db: SqlitePool,
    clock: Arc<dyn Clock>,
    config: SubmissionConfig,
}

impl SubmissionWorkflow {
    pub fn new(db: SqlitePool, clock: Arc<dyn Clock>, config: SubmissionConfig) -> Self {
        Self { db, clock, config }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    fn code_generator(&self, kind: SubmissionKind) -> CodeGenerator {
        match kind {
            SubmissionKind::Evaluation => CodeGenerator::new(&self.config.evaluation_prefix),
            SubmissionKind::Report => CodeGenerator::new(&self.config.report_prefix),
        }
    }

    /// Store a new `pending` submission with its children and initial log entry
    pub async fn create(
        &self,
        kind: SubmissionKind,
        submitter: &Administrator,
        draft: HeaderDraft<'_>,
        children: &dyn ChildRows,
    ) -> AppResult<SubmissionHeader> {
        let now = self.clock.now();
        let mut tx = db::begin_write(&self.db).await?;

        let organization_id = draft.organization_id.or(submitter.organization_id);
        if let Some(organization_id) = organization_id {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM organizations WHERE id = ?")
                .bind(organization_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(AppError::Validation(format!(
                    "Unknown organization: {}",
                    organization_id
                )));
            }
        }

        let report_year = match draft.report_year {
            Some(year) => year,
            None => PeriodManager::active_on(&mut tx)
                .await?
                .map(|period| period.report_year)
                .ok_or_else(|| {
                    AppError::Validation(
                        "report_year is required while no reporting period is active".to_string(),
                    )
                })?,
        };

        // Decided once; later deadline changes do not relabel this row
        let is_late = PeriodManager::for_year(&mut tx, report_year)
            .await?
            .map(|period| period.is_late(now))
            .unwrap_or(false);

        let category = match (kind, draft.score) {
            (SubmissionKind::Evaluation, Some(score)) => {
                let ranges = load_categories(&mut tx).await?;
                categorize(score, &ranges)
            }
            _ => None,
        };

        let resolved = ResolvedHeader {
            organization_id,
            region: draft.region.or(submitter.region),
            report_year,
            submitted_by: submitter.id,
            submitted_at: now,
            is_late,
            category,
            draft,
        };

        let id = self.insert_with_unique_code(&mut tx, kind, &resolved).await?;

        children.insert(&mut tx, id).await?;

        StatusLog::append(
            &mut tx,
            &NewStatusLogEntry {
                submission_type: kind,
                submission_id: id,
                previous_status: None,
                new_status: SubmissionStatus::Pending,
                remark: resolved.draft.remark,
                organization_id,
                acted_by: submitter.id,
                created_at: now,
            },
        )
        .await?;

        let header = fetch_header(&mut tx, kind, id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("{} {} vanished during creation", kind.as_str(), id)))?;

        tx.commit().await?;

        metrics::record_submission_created(kind.as_str(), header.is_late);
        tracing::info!(
            "Created {} {} (id {}) by account {}{}",
            kind.as_str(),
            header.code,
            id,
            submitter.id,
            if header.is_late { ", late" } else { "" }
        );

        Ok(header)
    }

    /// Insert the header row under a fresh code
    ///
    /// Random candidates are checked against the table and then guarded by
    /// the UNIQUE constraint; a concurrent writer that wins the same code
    /// only costs another attempt. After `max_code_attempts` collisions the
    /// counter-suffixed fallback is used.
    async fn insert_with_unique_code(
        &self,
        conn: &mut SqliteConnection,
        kind: SubmissionKind,
        header: &ResolvedHeader<'_>,
    ) -> AppResult<i64> {
        let generator = self.code_generator(kind);
        let exists_sql = format!("SELECT 1 FROM {} WHERE code = ?", kind.table());

        for _ in 0..self.config.max_code_attempts {
            let code = generator.candidate(header.submitted_at);

            let taken: Option<i64> = sqlx::query_scalar(&exists_sql)
                .bind(&code)
                .fetch_optional(&mut *conn)
                .await?;
            if taken.is_some() {
                metrics::record_code_collision(kind.as_str());
                tracing::debug!("Code {} already taken, retrying", code);
                continue;
            }

            match insert_header_row(conn, kind, &code, header).await {
                Ok(id) => return Ok(id),
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    metrics::record_code_collision(kind.as_str());
                    tracing::debug!("Code {} claimed concurrently, retrying", code);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let code = generator.fallback(header.submitted_at);
        tracing::warn!(
            "Exhausted {} random {} codes, using {}",
            self.config.max_code_attempts,
            kind.as_str(),
            code
        );

        match insert_header_row(conn, kind, &code, header).await {
            Ok(id) => Ok(id),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Internal(
                format!("Could not allocate a unique {} code", kind.as_str()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Header of a submission the administrator may see
    pub async fn get(
        &self,
        kind: SubmissionKind,
        id: i64,
        admin: &Administrator,
    ) -> AppResult<SubmissionHeader> {
        let mut conn = self.db.acquire().await?;
        visible_header(&mut conn, kind, id, admin).await
    }

    /// Scoped, filtered page ordered newest first
    pub async fn list(
        &self,
        kind: SubmissionKind,
        admin: &Administrator,
        filter: &SubmissionFilter,
    ) -> AppResult<Page<SubmissionHeader>> {
        let scope = Scope::for_admin(admin);

        let mut count_qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT COUNT(*) FROM {} s LEFT JOIN organizations o ON o.id = s.organization_id WHERE 1 = 1",
            kind.table()
        ));
        push_conditions(&mut count_qb, scope, filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.db).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(select_header_sql(kind));
        qb.push(" WHERE 1 = 1");
        push_conditions(&mut qb, scope, filter);
        qb.push(" ORDER BY s.submitted_at DESC, s.id DESC LIMIT ");
        qb.push_bind(filter.per_page() as i64);
        qb.push(" OFFSET ");
        qb.push_bind(filter.offset());

        let rows = qb.build().fetch_all(&self.db).await?;
        let items = rows
            .iter()
            .map(|row| parse_header(row, kind))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total,
            page: filter.page(),
            per_page: filter.per_page(),
        })
    }

    /// Move a submission to `new_status`
    ///
    /// Decisions stamp the acting administrator and the current time;
    /// returning to `pending` clears both. Repeating the current status is
    /// allowed and still logged.
    pub async fn set_status(
        &self,
        kind: SubmissionKind,
        id: i64,
        admin: &Administrator,
        new_status: SubmissionStatus,
        remark: Option<&str>,
    ) -> AppResult<SubmissionHeader> {
        let update_sql = format!(
            "UPDATE {} SET status = ?, verified_by = ?, verified_at = ? WHERE id = ? AND status = ?",
            kind.table()
        );

        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let mut tx = db::begin_write(&self.db).await?;
            let current = visible_header(&mut tx, kind, id, admin).await?;

            let now = self.clock.now();
            let (verified_by, verified_at) = if new_status.is_decision() {
                (Some(admin.id), Some(now))
            } else {
                (None, None)
            };

            let result = sqlx::query(&update_sql)
                .bind(new_status.as_str())
                .bind(verified_by)
                .bind(verified_at)
                .bind(id)
                .bind(current.status.as_str())
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() == 0 {
                // Status moved under us; the dropped transaction rolls back
                tracing::debug!(
                    "Concurrent transition on {} {} (attempt {})",
                    kind.as_str(),
                    id,
                    attempt
                );
                continue;
            }

            StatusLog::append(
                &mut tx,
                &NewStatusLogEntry {
                    submission_type: kind,
                    submission_id: id,
                    previous_status: Some(current.status),
                    new_status,
                    remark,
                    organization_id: current.organization_id,
                    acted_by: admin.id,
                    created_at: now,
                },
            )
            .await?;

            tx.commit().await?;

            metrics::record_transition(kind.as_str(), new_status.as_str());
            tracing::info!(
                "{} {} moved {} -> {} by account {}",
                kind.as_str(),
                current.code,
                current.status.as_str(),
                new_status.as_str(),
                admin.id
            );

            return Ok(SubmissionHeader {
                status: new_status,
                verified_by,
                verified_at,
                ..current
            });
        }

        Err(AppError::Conflict(format!(
            "{} {} is being updated concurrently",
            kind.as_str(),
            id
        )))
    }

    /// Remove a submission with its children and status log
    pub async fn delete(&self, kind: SubmissionKind, id: i64, admin: &Administrator) -> AppResult<()> {
        let mut tx = db::begin_write(&self.db).await?;
        let header = visible_header(&mut tx, kind, id, admin).await?;

        let logs = StatusLog::delete_for(&mut tx, kind, id).await?;

        let (child_table, parent_column) = kind.children();
        sqlx::query(&format!("DELETE FROM {} WHERE {} = ?", child_table, parent_column))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", kind.table()))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        metrics::record_submission_deleted(kind.as_str());
        tracing::info!(
            "Deleted {} {} ({} log entries) by account {}",
            kind.as_str(),
            header.code,
            logs,
            admin.id
        );

        Ok(())
    }

    /// Ordered status log of a visible submission
    pub async fn history(
        &self,
        kind: SubmissionKind,
        id: i64,
        admin: &Administrator,
    ) -> AppResult<Vec<StatusLogEntry>> {
        self.get(kind, id, admin).await?;
        StatusLog::new(self.db.clone()).history(kind, id).await
    }
}

async fn insert_header_row(
    conn: &mut SqliteConnection,
    kind: SubmissionKind,
    code: &str,
    header: &ResolvedHeader<'_>,
) -> Result<i64, sqlx::Error> {
    let sql = match kind {
        SubmissionKind::Evaluation => {
            r#"
            INSERT INTO evaluations
            (code, organization_name, organization_level, organization_id,
             origin_region_id, origin_district_id, origin_village_id, report_year,
             status, submitted_by, submitted_at, is_late, remark, score, category)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?)
            "#
        }
        SubmissionKind::Report => {
            r#"
            INSERT INTO reports
            (code, organization_name, organization_level, organization_id,
             origin_region_id, origin_district_id, origin_village_id, report_year,
             status, submitted_by, submitted_at, is_late, remark)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?)
            "#
        }
    };

    let mut query = sqlx::query(sql)
        .bind(code)
        .bind(header.draft.organization_name)
        .bind(header.draft.organization_level)
        .bind(header.organization_id)
        .bind(header.region.origin_region_id)
        .bind(header.region.origin_district_id)
        .bind(header.region.origin_village_id)
        .bind(header.report_year)
        .bind(header.submitted_by)
        .bind(header.submitted_at)
        .bind(header.is_late)
        .bind(header.draft.remark);

    if kind == SubmissionKind::Evaluation {
        query = query
            .bind(header.draft.score.unwrap_or(0))
            .bind(header.category.as_deref());
    }

    let result = query.execute(&mut *conn).await?;
    Ok(result.last_insert_rowid())
}

fn select_header_sql(kind: SubmissionKind) -> String {
    let extra = match kind {
        SubmissionKind::Evaluation => "s.score, s.category",
        SubmissionKind::Report => "NULL AS score, NULL AS category",
    };
    format!(
        "SELECT s.id, s.code, s.organization_name, s.organization_level, s.organization_id, \
         o.region_id AS organization_region_id, s.origin_region_id, s.origin_district_id, \
         s.origin_village_id, s.report_year, s.status, s.verified_by, s.verified_at, \
         s.submitted_by, s.submitted_at, s.is_late, s.remark, {} \
         FROM {} s LEFT JOIN organizations o ON o.id = s.organization_id",
        extra,
        kind.table()
    )
}

fn push_conditions(qb: &mut QueryBuilder<'_, Sqlite>, scope: Scope, filter: &SubmissionFilter) {
    scope.push_filter(qb, ScopeColumns::default());

    if let Some(status) = filter.status {
        qb.push(" AND s.status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(year) = filter.report_year {
        qb.push(" AND s.report_year = ");
        qb.push_bind(year);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        qb.push(" AND (s.code LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR s.organization_name LIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
}

pub(crate) async fn fetch_header(
    conn: &mut SqliteConnection,
    kind: SubmissionKind,
    id: i64,
) -> AppResult<Option<SubmissionHeader>> {
    let sql = format!("{} WHERE s.id = ?", select_header_sql(kind));
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.as_ref().map(|row| parse_header(row, kind)).transpose()
}

/// Fetch and scope-check; out-of-scope records answer like missing ones
pub(crate) async fn visible_header(
    conn: &mut SqliteConnection,
    kind: SubmissionKind,
    id: i64,
    admin: &Administrator,
) -> AppResult<SubmissionHeader> {
    let header = fetch_header(conn, kind, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {} not found", kind.as_str(), id)))?;

    if !Scope::for_admin(admin).visible(&header) {
        metrics::record_scope_denial(kind.as_str());
        tracing::warn!(
            "Account {} ({}) denied access to {} {}",
            admin.id,
            admin.role.as_str(),
            kind.as_str(),
            id
        );
        return Err(AppError::ScopeDenied(format!("{} {}", kind.as_str(), id)));
    }

    Ok(header)
}

fn parse_header(row: &SqliteRow, kind: SubmissionKind) -> AppResult<SubmissionHeader> {
    Ok(SubmissionHeader {
        id: row.try_get("id")?,
        kind,
        code: row.try_get("code")?,
        organization_name: row.try_get("organization_name")?,
        organization_level: row.try_get("organization_level")?,
        organization_id: row.try_get("organization_id")?,
        organization_region_id: row.try_get("organization_region_id")?,
        region: RegionAssignment {
            origin_region_id: row.try_get("origin_region_id")?,
            origin_district_id: row.try_get("origin_district_id")?,
            origin_village_id: row.try_get("origin_village_id")?,
        },
        report_year: row.try_get("report_year")?,
        status: SubmissionStatus::from_str(&row.try_get::<String, _>("status")?)?,
        verified_by: row.try_get("verified_by")?,
        verified_at: row.try_get("verified_at")?,
        submitted_by: row.try_get("submitted_by")?,
        submitted_at: row.try_get("submitted_at")?,
        is_late: row.try_get("is_late")?,
        remark: row.try_get("remark")?,
        score: row.try_get("score")?,
        category: row.try_get("category")?,
    })
}
