/// Evaluation scoring
use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

/// `round(sum(values) / max(count, 1) * 100)`
pub fn compute_score(values: &[f64]) -> i64 {
    let sum: f64 = values.iter().sum();
    let count = values.len().max(1) as f64;
    (sum / count * 100.0).round() as i64
}

/// Inclusive score range mapped to a category label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRange {
    pub label: String,
    pub min_score: i64,
    pub max_score: i64,
}

/// First range (by lower bound) containing `score`; no guessing when
/// nothing matches
pub fn categorize(score: i64, ranges: &[CategoryRange]) -> Option<String> {
    ranges
        .iter()
        .filter(|r| r.min_score <= score && score <= r.max_score)
        .min_by_key(|r| r.min_score)
        .map(|r| r.label.clone())
}

pub async fn load_categories(conn: &mut SqliteConnection) -> AppResult<Vec<CategoryRange>> {
    let rows: Vec<(String, i64, i64)> = sqlx::query_as(
        "SELECT label, min_score, max_score FROM evaluation_categories ORDER BY min_score, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(label, min_score, max_score)| CategoryRange {
            label,
            min_score,
            max_score,
        })
        .collect())
}
