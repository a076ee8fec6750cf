/// API routes and handlers
pub mod accounts;
pub mod auth;
pub mod dashboard;
pub mod evaluations;
pub mod extract;
pub mod middleware;
pub mod reports;
pub mod settings;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(auth::routes())
        .merge(accounts::routes())
        .merge(evaluations::routes())
        .merge(reports::routes())
        .merge(dashboard::routes())
        .merge(settings::routes())
}
