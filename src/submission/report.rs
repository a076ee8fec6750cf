/// Activity report submissions
use super::{
    trimmed,
    workflow::{ChildRows, HeaderDraft, SubmissionWorkflow},
    Page, SubmissionFilter, SubmissionHeader, SubmissionKind, SubmissionStatus,
};
use crate::{
    admin::{Administrator, RegionAssignment},
    audit::StatusLogEntry,
    error::AppResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub id: i64,
    pub position: i64,
    pub section_key: String,
    pub title: String,
    pub content: String,
}

/// Report with its sections in document order
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(flatten)]
    pub header: SubmissionHeader,
    pub sections: Vec<ReportSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewSection {
    #[validate(length(min = 1, max = 100))]
    pub section_key: String,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 65536))]
    pub content: String,
}

/// Report payload
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewReport {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 255))]
    pub organization_name: String,
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 100))]
    pub organization_level: String,
    pub organization_id: Option<i64>,
    #[serde(flatten)]
    pub region: RegionAssignment,
    #[validate(range(min = 2000, max = 2100))]
    pub report_year: Option<i32>,
    #[validate(length(max = 2000))]
    pub remark: Option<String>,
    #[validate(length(min = 1, max = 100), nested)]
    pub sections: Vec<NewSection>,
}

#[async_trait]
impl ChildRows for Vec<NewSection> {
    async fn insert(&self, conn: &mut SqliteConnection, submission_id: i64) -> AppResult<()> {
        for (position, section) in self.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO report_sections (report_id, position, section_key, title, content)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(submission_id)
            .bind(position as i64)
            .bind(&section.section_key)
            .bind(&section.title)
            .bind(&section.content)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}

/// Report manager
#[derive(Clone)]
pub struct ReportManager {
    workflow: SubmissionWorkflow,
}

impl ReportManager {
    pub fn new(workflow: SubmissionWorkflow) -> Self {
        Self { workflow }
    }

    pub async fn create(&self, submitter: &Administrator, payload: &NewReport) -> AppResult<Report> {
        let draft = HeaderDraft {
            organization_name: &payload.organization_name,
            organization_level: &payload.organization_level,
            organization_id: payload.organization_id,
            region: payload.region,
            report_year: payload.report_year,
            remark: payload.remark.as_deref(),
            score: None,
        };

        let header = self
            .workflow
            .create(SubmissionKind::Report, submitter, draft, &payload.sections)
            .await?;

        let sections = self.sections(header.id).await?;
        Ok(Report { header, sections })
    }

    pub async fn get(&self, id: i64, admin: &Administrator) -> AppResult<Report> {
        let header = self.workflow.get(SubmissionKind::Report, id, admin).await?;
        let sections = self.sections(id).await?;
        Ok(Report { header, sections })
    }

    pub async fn list(
        &self,
        admin: &Administrator,
        filter: &SubmissionFilter,
    ) -> AppResult<Page<SubmissionHeader>> {
        self.workflow.list(SubmissionKind::Report, admin, filter).await
    }

    pub async fn set_status(
        &self,
        id: i64,
        admin: &Administrator,
        status: SubmissionStatus,
        remark: Option<&str>,
    ) -> AppResult<SubmissionHeader> {
        self.workflow
            .set_status(SubmissionKind::Report, id, admin, status, remark)
            .await
    }

    /// Removes sections and status log together with the report
    pub async fn delete(&self, id: i64, admin: &Administrator) -> AppResult<()> {
        self.workflow.delete(SubmissionKind::Report, id, admin).await
    }

    pub async fn history(&self, id: i64, admin: &Administrator) -> AppResult<Vec<StatusLogEntry>> {
        self.workflow.history(SubmissionKind::Report, id, admin).await
    }

    async fn sections(&self, report_id: i64) -> AppResult<Vec<ReportSection>> {
        let rows: Vec<(i64, i64, String, String, String)> = sqlx::query_as(
            r#"
            SELECT id, position, section_key, title, content
            FROM report_sections
            WHERE report_id = ?
            ORDER BY position, id
            "#,
        )
        .bind(report_id)
        .fetch_all(self.workflow.db())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, position, section_key, title, content)| ReportSection {
                id,
                position,
                section_key,
                title,
                content,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{admin::Role, clock::SystemClock, config::SubmissionConfig, db};
    use chrono::Utc;
    use std::sync::Arc;

    fn village_admin() -> Administrator {
        Administrator {
            id: 1,
            name: "Kepala Desa".to_string(),
            email: "desa@example.go.id".to_string(),
            role: Role::VillageAdmin,
            organization_id: None,
            organization_level_id: None,
            organization_region_id: None,
            region: RegionAssignment {
                origin_region_id: Some(3),
                origin_district_id: Some(7),
                origin_village_id: Some(71),
            },
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    async fn setup() -> ReportManager {
        let pool = db::memory_pool().await.unwrap();
        sqlx::query(
            "INSERT INTO accounts (id, name, email, password_hash, role, created_at) VALUES (1, 'Kepala Desa', 'desa@example.go.id', 'x', 'village_admin', ?)",
        )
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        let workflow = SubmissionWorkflow::new(pool, Arc::new(SystemClock), SubmissionConfig::default());
        ReportManager::new(workflow)
    }

    fn payload() -> NewReport {
        NewReport {
            organization_name: "Pemerintah Desa Sukamaju".to_string(),
            organization_level: "Desa".to_string(),
            organization_id: None,
            region: RegionAssignment::default(),
            report_year: Some(2025),
            remark: Some("Laporan tahunan".to_string()),
            sections: vec![
                NewSection {
                    section_key: "summary".to_string(),
                    title: "Ringkasan".to_string(),
                    content: "Kegiatan berjalan sesuai rencana.".to_string(),
                },
                NewSection {
                    section_key: "budget".to_string(),
                    title: "Anggaran".to_string(),
                    content: "Realisasi 92%.".to_string(),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_create_keeps_section_order() {
        let manager = setup().await;
        let report = manager.create(&village_admin(), &payload()).await.unwrap();

        assert_eq!(report.header.score, None);
        assert_eq!(report.header.region.origin_village_id, Some(71));
        let keys: Vec<&str> = report.sections.iter().map(|s| s.section_key.as_str()).collect();
        assert_eq!(keys, vec!["summary", "budget"]);
    }

    #[tokio::test]
    async fn test_delete_removes_sections_and_log() {
        let manager = setup().await;
        let admin = village_admin();
        let report = manager.create(&admin, &payload()).await.unwrap();

        manager.delete(report.header.id, &admin).await.unwrap();

        let sections: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM report_sections")
            .fetch_one(manager.workflow.db())
            .await
            .unwrap();
        let logs: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM submission_status_logs WHERE submission_type = 'report'",
        )
        .fetch_one(manager.workflow.db())
        .await
        .unwrap();
        assert_eq!((sections, logs), (0, 0));
    }

    #[test]
    fn test_report_without_sections_is_invalid() {
        let mut invalid = payload();
        invalid.sections.clear();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_invalid_section_fails_the_payload() {
        let mut invalid = payload();
        invalid.sections[1].title.clear();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_snapshot_names_are_trimmed_before_validation() {
        let body = serde_json::json!({
            "organization_name": "  Pemerintah Desa Sukamaju ",
            "organization_level": "Desa",
            "report_year": 2025,
            "sections": [{"section_key": "summary", "title": "Ringkasan", "content": "Isi"}],
        });
        let parsed: NewReport = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.organization_name, "Pemerintah Desa Sukamaju");
        assert!(parsed.validate().is_ok());

        let blank = serde_json::json!({
            "organization_name": "   ",
            "organization_level": "Desa",
            "sections": [{"section_key": "summary", "title": "Ringkasan", "content": "Isi"}],
        });
        let parsed: NewReport = serde_json::from_value(blank).unwrap();
        assert!(parsed.validate().is_err());
    }
}
