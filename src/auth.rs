/// Authentication extractors and utilities
use crate::{
    admin::Administrator, api::middleware::extract_bearer_token, context::AppContext,
    error::AppError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated context - extracts and validates session from request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub session_id: String,
    pub account: Administrator,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let session = state.account_manager.validate_access_token(&token).await?;

        Ok(AuthContext {
            session_id: session.session_id,
            account: session.account,
        })
    }
}

/// Macro to require a minimum role
/// Usage: require_role!(auth, Role::ProvinceAdmin);
#[macro_export]
macro_rules! require_role {
    ($auth:expr, $required:expr) => {
        if !$auth.account.role.can_act_as($required) {
            tracing::warn!(
                "Account {} ({}) lacks {} role",
                $auth.account.id,
                $auth.account.role.as_str(),
                $required.as_str()
            );
            return Err($crate::error::AppError::Authorization(format!(
                "Requires {} role or higher",
                $required.as_str()
            )));
        }
    };
}
