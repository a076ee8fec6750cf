/// Dashboard endpoint
use crate::{
    api::extract::ValidatedQuery, auth::AuthContext, context::AppContext, dashboard::DashboardSummary,
    error::AppResult,
};
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct DashboardQuery {
    report_year: Option<i32>,
}

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/dashboard", get(dashboard))
}

async fn dashboard(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedQuery(query): ValidatedQuery<DashboardQuery>,
) -> AppResult<Json<DashboardSummary>> {
    let summary = ctx.dashboard.summary(&auth.account, query.report_year).await?;
    Ok(Json(summary))
}
