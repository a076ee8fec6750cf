/// Scope resolution
///
/// Turns an administrator into the set of records it may see or act on.
/// The same [`Scope`] answers both as an in-memory predicate
/// ([`Scope::visible`]) and as a SQL condition appended to a query before
/// pagination ([`Scope::push_filter`]); the two must always agree.
use crate::{
    admin::{Administrator, RegionAssignment, RegionField, Role, ScopeRule},
    submission::SubmissionKind,
};
use sqlx::{QueryBuilder, Sqlite};

/// Anything carrying origin region fields and an organization link
pub trait ScopedRecord {
    fn region(&self) -> &RegionAssignment;
    fn organization_id(&self) -> Option<i64>;
    /// Regency of the linked organization, if any
    fn organization_region_id(&self) -> Option<i64>;
}

/// Table aliases the filter is rendered against
///
/// `organization` must be a LEFT JOIN of `organizations` on the record's
/// `organization_id`.
#[derive(Debug, Clone, Copy)]
pub struct ScopeColumns {
    pub record: &'static str,
    pub organization: &'static str,
}

impl Default for ScopeColumns {
    fn default() -> Self {
        Self {
            record: "s",
            organization: "o",
        }
    }
}

/// Resolved visibility of one administrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Everything
    All,
    /// Records whose origin `field` equals `id`; for the regency field a
    /// record without an origin region also matches through its
    /// organization's regency
    Region { field: RegionField, id: i64 },
    /// Records linked to one organization
    Organization { organization_id: i64 },
    /// Nothing; the administrator lacks the field its role compares on
    Nothing,
}

impl Scope {
    pub fn for_admin(admin: &Administrator) -> Self {
        match admin.role.scope_rule() {
            ScopeRule::Unrestricted => Scope::All,
            ScopeRule::ByRegion(field) => match field.value_of(&admin.region) {
                Some(id) => Scope::Region { field, id },
                None => Scope::Nothing,
            },
            ScopeRule::ByOrganization => match admin.organization_id {
                Some(organization_id) => Scope::Organization { organization_id },
                None => Scope::Nothing,
            },
        }
    }

    /// Scope used by dashboard figures, `None` when the kind is hidden
    /// from the role altogether
    pub fn for_dashboard(admin: &Administrator, kind: SubmissionKind) -> Option<Self> {
        if kind == SubmissionKind::Report && !admin.role.sees_reports_on_dashboard() {
            return None;
        }
        Some(Self::for_admin(admin))
    }

    pub fn visible<R: ScopedRecord + ?Sized>(&self, record: &R) -> bool {
        match *self {
            Scope::All => true,
            Scope::Nothing => false,
            Scope::Region { field, id } => match field.value_of(record.region()) {
                Some(value) => value == id,
                None if field == RegionField::Region => {
                    record.organization_region_id() == Some(id)
                }
                None => false,
            },
            Scope::Organization { organization_id } => {
                record.organization_id() == Some(organization_id)
            }
        }
    }

    /// Append ` AND <condition>` to a query whose WHERE clause is open
    pub fn push_filter(&self, qb: &mut QueryBuilder<'_, Sqlite>, cols: ScopeColumns) {
        match *self {
            Scope::All => {}
            Scope::Nothing => {
                qb.push(" AND 0");
            }
            Scope::Region { field, id } => {
                if field == RegionField::Region {
                    qb.push(format!(" AND ({}.{} = ", cols.record, field.column()));
                    qb.push_bind(id);
                    qb.push(format!(
                        " OR ({}.{} IS NULL AND {}.region_id = ",
                        cols.record,
                        field.column(),
                        cols.organization
                    ));
                    qb.push_bind(id);
                    qb.push("))");
                } else {
                    qb.push(format!(" AND {}.{} = ", cols.record, field.column()));
                    qb.push_bind(id);
                }
            }
            Scope::Organization { organization_id } => {
                qb.push(format!(" AND {}.organization_id = ", cols.record));
                qb.push_bind(organization_id);
            }
        }
    }
}

/// Whether `role` may create accounts with role `target`
pub fn can_assign_role(actor: Role, target: Role) -> bool {
    actor.can_act_as(target)
}
