/// Administrator account endpoints
use crate::{
    account::{AccountFilter, CreateAccountRequest},
    admin::Administrator,
    api::extract::{ValidatedJson, ValidatedPath, ValidatedQuery},
    auth::AuthContext,
    context::AppContext,
    error::AppResult,
    submission::Page,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/accounts", get(list_accounts).post(create_account))
        .route("/api/accounts/:id", get(get_account))
}

async fn list_accounts(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedQuery(filter): ValidatedQuery<AccountFilter>,
) -> AppResult<Json<Page<Administrator>>> {
    let page = ctx.account_manager.list_accounts(&auth.account, &filter).await?;
    Ok(Json(page))
}

async fn get_account(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedPath(id): ValidatedPath<i64>,
) -> AppResult<Json<Administrator>> {
    let account = ctx.account_manager.get_visible(id, &auth.account).await?;
    Ok(Json(account))
}

async fn create_account(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<CreateAccountRequest>,
) -> AppResult<(StatusCode, Json<Administrator>)> {
    let account = ctx
        .account_manager
        .create_account(Some(&auth.account), &req)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}
