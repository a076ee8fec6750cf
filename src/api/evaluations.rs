/// Evaluation endpoints
use crate::{
    api::extract::{ValidatedJson, ValidatedPath, ValidatedQuery},
    audit::StatusLogEntry,
    auth::AuthContext,
    context::AppContext,
    error::AppResult,
    submission::{Evaluation, NewEvaluation, Page, StatusUpdateRequest, SubmissionFilter, SubmissionHeader},
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/evaluations", get(list_evaluations).post(create_evaluation))
        .route("/api/evaluations/:id", get(get_evaluation).delete(delete_evaluation))
        .route("/api/evaluations/:id/status", post(update_status))
        .route("/api/evaluations/:id/history", get(history))
}

async fn create_evaluation(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedJson(payload): ValidatedJson<NewEvaluation>,
) -> AppResult<(StatusCode, Json<Evaluation>)> {
    let evaluation = ctx.evaluation_manager.create(&auth.account, &payload).await?;
    Ok((StatusCode::CREATED, Json(evaluation)))
}

async fn list_evaluations(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedQuery(filter): ValidatedQuery<SubmissionFilter>,
) -> AppResult<Json<Page<SubmissionHeader>>> {
    let page = ctx.evaluation_manager.list(&auth.account, &filter).await?;
    Ok(Json(page))
}

async fn get_evaluation(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedPath(id): ValidatedPath<i64>,
) -> AppResult<Json<Evaluation>> {
    let evaluation = ctx.evaluation_manager.get(id, &auth.account).await?;
    Ok(Json(evaluation))
}

async fn update_status(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedPath(id): ValidatedPath<i64>,
    ValidatedJson(req): ValidatedJson<StatusUpdateRequest>,
) -> AppResult<Json<SubmissionHeader>> {
    let header = ctx
        .evaluation_manager
        .set_status(id, &auth.account, req.status, req.remark.as_deref())
        .await?;
    Ok(Json(header))
}

async fn delete_evaluation(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedPath(id): ValidatedPath<i64>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.evaluation_manager.delete(id, &auth.account).await?;
    Ok(Json(json!({ "success": true })))
}

async fn history(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedPath(id): ValidatedPath<i64>,
) -> AppResult<Json<Vec<StatusLogEntry>>> {
    let entries = ctx.evaluation_manager.history(id, &auth.account).await?;
    Ok(Json(entries))
}
