/// Role/Region model
///
/// Describes an administrator's level in the province → regency →
/// district → village hierarchy and the region or organization it is
/// anchored to.

pub mod roles;

pub use roles::{RegionAssignment, RegionField, Role, ScopeRule};

use crate::scope::ScopedRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated administrator account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Administrator {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub organization_id: Option<i64>,
    pub organization_level_id: Option<i64>,
    /// Regency of the linked organization, resolved at load time
    pub organization_region_id: Option<i64>,
    #[serde(flatten)]
    pub region: RegionAssignment,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScopedRecord for Administrator {
    fn region(&self) -> &RegionAssignment {
        &self.region
    }

    fn organization_id(&self) -> Option<i64> {
        self.organization_id
    }

    fn organization_region_id(&self) -> Option<i64> {
        self.organization_region_id
    }
}
