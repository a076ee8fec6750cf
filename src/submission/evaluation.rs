/// Evaluation submissions
///
/// An evaluation is a questionnaire: each answer carries a value in
/// `[0, 1]` and the header stores the derived score and category.
use super::{
    trimmed,
    score::compute_score,
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
pub struct EvaluationAnswer {
    pub id: i64,
    pub question_key: String,
    pub value: f64,
    pub note: Option<String>,
}

/// Evaluation with its answers
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    #[serde(flatten)]
    pub header: SubmissionHeader,
    pub answers: Vec<EvaluationAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewAnswer {
    #[validate(length(min = 1, max = 100))]
    pub question_key: String,
    #[validate(range(min = 0.0, max = 1.0))]
    pub value: f64,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

/// Evaluation payload
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewEvaluation {
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
    #[validate(length(max = 500), nested)]
    #[serde(default)]
    pub answers: Vec<NewAnswer>,
}

#[async_trait]
impl ChildRows for Vec<NewAnswer> {
    async fn insert(&self, conn: &mut SqliteConnection, submission_id: i64) -> AppResult<()> {
        for answer in self {
            sqlx::query(
                "INSERT INTO evaluation_answers (evaluation_id, question_key, value, note) VALUES (?, ?, ?, ?)",
            )
            .bind(submission_id)
            .bind(&answer.question_key)
            .bind(answer.value)
            .bind(&answer.note)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}

/// Evaluation manager
#[derive(Clone)]
pub struct EvaluationManager {
    workflow: SubmissionWorkflow,
}

impl EvaluationManager {
    pub fn new(workflow: SubmissionWorkflow) -> Self {
        Self { workflow }
    }

    pub async fn create(&self, submitter: &Administrator, payload: &NewEvaluation) -> AppResult<Evaluation> {
        let values: Vec<f64> = payload.answers.iter().map(|a| a.value).collect();
        let score = compute_score(&values);

        let draft = HeaderDraft {
            organization_name: &payload.organization_name,
            organization_level: &payload.organization_level,
            organization_id: payload.organization_id,
            region: payload.region,
            report_year: payload.report_year,
            remark: payload.remark.as_deref(),
            score: Some(score),
        };

        let header = self
            .workflow
            .create(SubmissionKind::Evaluation, submitter, draft, &payload.answers)
            .await?;

        let answers = self.answers(header.id).await?;
        Ok(Evaluation { header, answers })
    }

    pub async fn get(&self, id: i64, admin: &Administrator) -> AppResult<Evaluation> {
        let header = self.workflow.get(SubmissionKind::Evaluation, id, admin).await?;
        let answers = self.answers(id).await?;
        Ok(Evaluation { header, answers })
    }

    pub async fn list(
        &self,
        admin: &Administrator,
        filter: &SubmissionFilter,
    ) -> AppResult<Page<SubmissionHeader>> {
        self.workflow.list(SubmissionKind::Evaluation, admin, filter).await
    }

    /// Score and category survive a return to `pending`
    pub async fn set_status(
        &self,
        id: i64,
        admin: &Administrator,
        status: SubmissionStatus,
        remark: Option<&str>,
    ) -> AppResult<SubmissionHeader> {
        self.workflow
            .set_status(SubmissionKind::Evaluation, id, admin, status, remark)
            .await
    }

    pub async fn delete(&self, id: i64, admin: &Administrator) -> AppResult<()> {
        self.workflow.delete(SubmissionKind::Evaluation, id, admin).await
    }

    pub async fn history(&self, id: i64, admin: &Administrator) -> AppResult<Vec<StatusLogEntry>> {
        self.workflow.history(SubmissionKind::Evaluation, id, admin).await
    }

    async fn answers(&self, evaluation_id: i64) -> AppResult<Vec<EvaluationAnswer>> {
        let rows: Vec<(i64, String, f64, Option<String>)> = sqlx::query_as(
            "SELECT id, question_key, value, note FROM evaluation_answers WHERE evaluation_id = ? ORDER BY id",
        )
        .bind(evaluation_id)
        .fetch_all(self.workflow.db())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, question_key, value, note)| EvaluationAnswer {
                id,
                question_key,
                value,
                note,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{admin::Role, clock::SystemClock, config::SubmissionConfig, db, error::AppError};
    use chrono::Utc;
    use std::sync::Arc;

    fn super_admin() -> Administrator {
        Administrator {
            id: 1,
            name: "Root".to_string(),
            email: "root@example.go.id".to_string(),
            role: Role::SuperAdmin,
            organization_id: None,
            organization_level_id: None,
            organization_region_id: None,
            region: RegionAssignment::default(),
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    async fn setup() -> EvaluationManager {
        let pool = db::memory_pool().await.unwrap();
        sqlx::query(
            "INSERT INTO accounts (id, name, email, password_hash, role, created_at) VALUES (1, 'Root', 'root@example.go.id', 'x', 'super_admin', ?)",
        )
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO evaluation_categories (label, min_score, max_score) VALUES ('Kurang', 0, 59), ('Cukup', 60, 79), ('Baik', 80, 100)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let workflow = SubmissionWorkflow::new(pool, Arc::new(SystemClock), SubmissionConfig::default());
        EvaluationManager::new(workflow)
    }

    fn payload(ones: usize, zeros: usize) -> NewEvaluation {
        let mut answers = Vec::new();
        for i in 0..ones + zeros {
            answers.push(NewAnswer {
                question_key: format!("q{}", i + 1),
                value: if i < ones { 1.0 } else { 0.0 },
                note: None,
            });
        }
        NewEvaluation {
            organization_name: "Dinas Kesehatan".to_string(),
            organization_level: "Provinsi".to_string(),
            organization_id: None,
            region: RegionAssignment::default(),
            report_year: Some(2025),
            remark: None,
            answers,
        }
    }

    #[tokio::test]
    async fn test_create_scores_and_categorizes() {
        let manager = setup().await;
        let evaluation = manager.create(&super_admin(), &payload(7, 3)).await.unwrap();

        assert_eq!(evaluation.header.score, Some(70));
        assert_eq!(evaluation.header.category.as_deref(), Some("Cukup"));
        assert_eq!(evaluation.answers.len(), 10);
        assert!(evaluation.header.code.starts_with("EVL-"));
    }

    #[tokio::test]
    async fn test_reopen_keeps_score() {
        let manager = setup().await;
        let admin = super_admin();
        let evaluation = manager.create(&admin, &payload(9, 1)).await.unwrap();

        manager
            .set_status(evaluation.header.id, &admin, SubmissionStatus::Verified, None)
            .await
            .unwrap();
        let reopened = manager
            .set_status(evaluation.header.id, &admin, SubmissionStatus::Pending, Some("recheck"))
            .await
            .unwrap();

        assert_eq!(reopened.score, Some(90));
        assert_eq!(reopened.category.as_deref(), Some("Baik"));
        assert_eq!(reopened.verified_by, None);
    }

    #[tokio::test]
    async fn test_delete_removes_answers() {
        let manager = setup().await;
        let admin = super_admin();
        let evaluation = manager.create(&admin, &payload(1, 1)).await.unwrap();

        manager.delete(evaluation.header.id, &admin).await.unwrap();

        let answers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM evaluation_answers")
            .fetch_one(manager.workflow.db())
            .await
            .unwrap();
        assert_eq!(answers, 0);
        assert!(matches!(
            manager.get(evaluation.header.id, &admin).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_answer_value_out_of_range_is_rejected() {
        let mut invalid = payload(1, 0);
        invalid.answers[0].value = 3.0;
        assert!(invalid.validate().is_err());
        assert!(payload(1, 0).validate().is_ok());
    }

    #[test]
    fn test_blank_organization_level_is_rejected() {
        let body = serde_json::json!({
            "organization_name": "Dinas Pendidikan",
            "organization_level": " \t ",
            "report_year": 2025,
            "answers": [{"question_key": "q1", "value": 1.0}],
        });
        let parsed: NewEvaluation = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.organization_level, "");
        assert!(parsed.validate().is_err());
    }
}
