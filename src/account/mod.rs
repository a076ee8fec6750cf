/// Account management system
///
/// Administrator accounts, password verification and bearer sessions.

mod manager;

pub use manager::AccountManager;

use crate::admin::{Administrator, RegionAssignment, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

/// Successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub status: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub account: Administrator,
}

/// Issued session
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub account_id: i64,
    pub access_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Validated session from bearer token
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub session_id: String,
    pub account: Administrator,
}

/// Account creation request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 256))]
    pub password: String,
    pub role: Role,
    pub organization_id: Option<i64>,
    pub organization_level_id: Option<i64>,
    #[serde(flatten)]
    pub region: RegionAssignment,
}

/// Account listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountFilter {
    pub role: Option<Role>,
    /// Matches name or email
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl AccountFilter {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(20).clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() as i64 - 1) * self.per_page() as i64
    }
}
