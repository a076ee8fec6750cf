/// Administrator roles and the region level each one is anchored to
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Administrator role levels
///
/// Variants are declared from the narrowest to the broadest reach so the
/// derived ordering doubles as the rank used for role management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Organization-bound administrator without a regional level
    #[serde(rename = "admin")]
    GenericAdmin,
    /// Village (desa/kelurahan) administrator
    VillageAdmin,
    /// District (kecamatan) administrator
    DistrictAdmin,
    /// Regency/city (kabupaten/kota) administrator
    RegencyAdmin,
    /// Province administrator
    ProvinceAdmin,
    /// Full access
    SuperAdmin,
}

/// Region column an administrator's origin is compared on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionField {
    Region,
    District,
    Village,
}

impl RegionField {
    /// Column holding this field on accounts and submissions
    pub fn column(&self) -> &'static str {
        match self {
            RegionField::Region => "origin_region_id",
            RegionField::District => "origin_district_id",
            RegionField::Village => "origin_village_id",
        }
    }

    pub fn value_of(&self, region: &RegionAssignment) -> Option<i64> {
        match self {
            RegionField::Region => region.origin_region_id,
            RegionField::District => region.origin_district_id,
            RegionField::Village => region.origin_village_id,
        }
    }
}

/// How a role's visibility is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRule {
    /// Top of the hierarchy, never region-restricted
    Unrestricted,
    /// Records whose origin field equals the administrator's
    ByRegion(RegionField),
    /// Records linked to the administrator's organization
    ByOrganization,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::SuperAdmin,
        Role::ProvinceAdmin,
        Role::RegencyAdmin,
        Role::DistrictAdmin,
        Role::VillageAdmin,
        Role::GenericAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::ProvinceAdmin => "province_admin",
            Role::RegencyAdmin => "regency_admin",
            Role::DistrictAdmin => "district_admin",
            Role::VillageAdmin => "village_admin",
            Role::GenericAdmin => "admin",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            "province_admin" => Ok(Role::ProvinceAdmin),
            "regency_admin" => Ok(Role::RegencyAdmin),
            "district_admin" => Ok(Role::DistrictAdmin),
            "village_admin" => Ok(Role::VillageAdmin),
            "admin" => Ok(Role::GenericAdmin),
            _ => Err(AppError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// The single role → comparator table
    ///
    /// Exhaustive on purpose: a new variant does not compile until it is
    /// given a rule here.
    pub fn scope_rule(&self) -> ScopeRule {
        match self {
            Role::SuperAdmin | Role::ProvinceAdmin => ScopeRule::Unrestricted,
            Role::RegencyAdmin => ScopeRule::ByRegion(RegionField::Region),
            Role::DistrictAdmin => ScopeRule::ByRegion(RegionField::District),
            Role::VillageAdmin => ScopeRule::ByRegion(RegionField::Village),
            Role::GenericAdmin => ScopeRule::ByOrganization,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.scope_rule() == ScopeRule::Unrestricted
    }

    /// District and village dashboards count evaluations only
    pub fn sees_reports_on_dashboard(&self) -> bool {
        !matches!(self, Role::DistrictAdmin | Role::VillageAdmin)
    }

    /// Check if this role can perform actions requiring another role
    pub fn can_act_as(&self, required: Role) -> bool {
        self >= &required
    }
}

/// Geographic scope an account was registered under
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionAssignment {
    pub origin_region_id: Option<i64>,
    pub origin_district_id: Option<i64>,
    pub origin_village_id: Option<i64>,
}

impl RegionAssignment {
    /// Fill fields missing from `self` with the ones from `fallback`
    pub fn or(self, fallback: RegionAssignment) -> RegionAssignment {
        RegionAssignment {
            origin_region_id: self.origin_region_id.or(fallback.origin_region_id),
            origin_district_id: self.origin_district_id.or(fallback.origin_district_id),
            origin_village_id: self.origin_village_id.or(fallback.origin_village_id),
        }
    }
}
