/// Reporting period settings
use crate::{
    admin::Role,
    api::extract::ValidatedJson,
    auth::AuthContext,
    context::AppContext,
    error::{AppError, AppResult},
    require_role,
    submission::ReportingPeriod,
};
use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdatePeriodRequest {
    #[validate(range(min = 2000, max = 2100))]
    pub report_year: i32,
    pub deadline: DateTime<Utc>,
}

pub fn routes() -> Router<AppContext> {
    Router::new().route(
        "/api/settings/reporting-period",
        get(get_reporting_period).put(update_reporting_period),
    )
}

async fn get_reporting_period(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
) -> AppResult<Json<ReportingPeriod>> {
    let period = ctx
        .period_manager
        .active()
        .await?
        .ok_or_else(|| AppError::NotFound("No active reporting period".to_string()))?;
    Ok(Json(period))
}

async fn update_reporting_period(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<UpdatePeriodRequest>,
) -> AppResult<Json<ReportingPeriod>> {
    require_role!(auth, Role::ProvinceAdmin);

    let period = ctx
        .period_manager
        .set_active(req.report_year, req.deadline, auth.account.id, ctx.clock.now())
        .await?;
    Ok(Json(period))
}
