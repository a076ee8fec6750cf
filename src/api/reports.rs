/// Activity report endpoints
use crate::{
    api::extract::{ValidatedJson, ValidatedPath, ValidatedQuery},
    audit::StatusLogEntry,
    auth::AuthContext,
    context::AppContext,
    error::AppResult,
    submission::{NewReport, Page, Report, StatusUpdateRequest, SubmissionFilter, SubmissionHeader},
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
        .route("/api/reports", get(list_reports).post(create_report))
        .route("/api/reports/:id", get(get_report).delete(delete_report))
        .route("/api/reports/:id/status", post(update_status))
        .route("/api/reports/:id/history", get(history))
}

async fn create_report(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedJson(payload): ValidatedJson<NewReport>,
) -> AppResult<(StatusCode, Json<Report>)> {
    let report = ctx.report_manager.create(&auth.account, &payload).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn list_reports(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedQuery(filter): ValidatedQuery<SubmissionFilter>,
) -> AppResult<Json<Page<SubmissionHeader>>> {
    Ok(Json(ctx.report_manager.list(&auth.account, &filter).await?))
}

async fn get_report(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedPath(id): ValidatedPath<i64>,
) -> AppResult<Json<Report>> {
    Ok(Json(ctx.report_manager.get(id, &auth.account).await?))
}

async fn update_status(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedPath(id): ValidatedPath<i64>,
    ValidatedJson(req): ValidatedJson<StatusUpdateRequest>,
) -> AppResult<Json<SubmissionHeader>> {
    let header = ctx
        .report_manager
        .set_status(id, &auth.account, req.status, req.remark.as_deref())
        .await?;
    Ok(Json(header))
}

async fn delete_report(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedPath(id): ValidatedPath<i64>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.report_manager.delete(id, &auth.account).await?;
    Ok(Json(json!({ "success": true })))
}

async fn history(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedPath(id): ValidatedPath<i64>,
) -> AppResult<Json<Vec<StatusLogEntry>>> {
    Ok(Json(ctx.report_manager.history(id, &auth.account).await?))
}
