/// Login, logout and current-account endpoints
use crate::{
    account::{LoginRequest, LoginResponse},
    admin::Administrator,
    api::{extract::parse_validated, middleware::client_ip},
    auth::AuthContext,
    context::AppContext,
    error::{AppError, AppResult},
    guard::LoginDecision,
    metrics,
};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tracing::{info, warn};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

/// Log in with email and password
///
/// A blocked address is answered before the body or the credentials are
/// looked at.
async fn login(
    State(ctx): State<AppContext>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let ip = client_ip(
        &headers,
        connect_info.as_ref(),
        ctx.config.service.trust_forwarded_for,
    );

    if let Some(context) = ctx.login_guard.check(&ip).await? {
        metrics::record_login("blocked");
        let message = format!(
            "Too many failed login attempts. Try again in {} seconds.",
            context.retry_after_seconds
        );
        return decision_response(StatusCode::FORBIDDEN, &LoginDecision::Blocked { context }, message);
    }

    let req: LoginRequest = parse_validated(&body)?;

    let Some(account) = ctx
        .account_manager
        .verify_credentials(&req.email, &req.password)
        .await?
    else {
        warn!("Failed login for {} from {}", req.email, ip);
        return match ctx.login_guard.record_failure(&ip).await? {
            LoginDecision::Blocked { context } => {
                metrics::record_login("blocked");
                let message = format!(
                    "Too many failed login attempts. Try again in {} seconds.",
                    context.retry_after_seconds
                );
                decision_response(StatusCode::FORBIDDEN, &LoginDecision::Blocked { context }, message)
            }
            decision => {
                metrics::record_login("unauthorized");
                decision_response(
                    StatusCode::UNAUTHORIZED,
                    &decision,
                    "Invalid email or password".to_string(),
                )
            }
        };
    };

    ctx.login_guard.record_success(&ip).await?;
    let session = ctx.account_manager.create_session(account.id).await?;
    metrics::record_login("success");
    info!("Account {} logged in from {}", account.id, ip);

    let body = LoginResponse {
        status: "success".to_string(),
        access_token: session.access_token,
        token_type: "Bearer".to_string(),
        expires_at: session.expires_at,
        account,
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

/// Guard decision with a human-readable message alongside
fn decision_response(status: StatusCode, decision: &LoginDecision, message: String) -> AppResult<Response> {
    let mut body = serde_json::to_value(decision)
        .map_err(|e| AppError::Internal(format!("Failed to encode login decision: {}", e)))?;
    if let Some(object) = body.as_object_mut() {
        object.insert("message".to_string(), json!(message));
    }
    Ok((status, Json(body)).into_response())
}

async fn logout(State(ctx): State<AppContext>, auth: AuthContext) -> AppResult<Json<serde_json::Value>> {
    ctx.account_manager.delete_session(&auth.session_id).await?;
    info!("Account {} logged out", auth.account.id);
    Ok(Json(json!({ "success": true })))
}

async fn me(auth: AuthContext) -> Json<Administrator> {
    Json(auth.account)
}
