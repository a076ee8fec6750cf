/// Account manager implementation using runtime queries
use crate::{
    account::{AccountFilter, CreateAccountRequest, Session, ValidatedSession},
    admin::{Administrator, RegionAssignment, Role},
    clock::Clock,
    config::ServerConfig,
    db,
    error::{AppError, AppResult},
    metrics,
    scope::{can_assign_role, Scope, ScopeColumns},
    submission::Page,
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

const SELECT_ACCOUNT: &str = r#"
    SELECT s.id, s.name, s.email, s.role, s.organization_id, s.organization_level_id,
           o.region_id AS organization_region_id,
           s.origin_region_id, s.origin_district_id, s.origin_village_id,
           s.last_login_at, s.created_at
    FROM accounts s LEFT JOIN organizations o ON o.id = s.organization_id"#;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    jti: String,
    iat: i64,
    exp: i64,
}

/// Account manager service
#[derive(Clone)]
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    clock: Arc<dyn Clock>,
}

impl AccountManager {
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>, clock: Arc<dyn Clock>) -> Self {
        Self { db, config, clock }
    }

    /// Create an account on behalf of `creator`
    ///
    /// The new account must lie inside the creator's scope and must not
    /// outrank the creator. `creator` is `None` only for bootstrap.
    pub async fn create_account(
        &self,
        creator: Option<&Administrator>,
        request: &CreateAccountRequest,
    ) -> AppResult<Administrator> {
        let organization_region_id = match request.organization_id {
            Some(organization_id) => Some(self.organization_region(organization_id).await?),
            None => None,
        }
        .flatten();

        if let Some(creator) = creator {
            if !can_assign_role(creator.role, request.role) {
                return Err(AppError::Authorization(format!(
                    "{} cannot create {} accounts",
                    creator.role.as_str(),
                    request.role.as_str()
                )));
            }

            let candidate = Administrator {
                id: 0,
                name: request.name.clone(),
                email: request.email.clone(),
                role: request.role,
                organization_id: request.organization_id,
                organization_level_id: request.organization_level_id,
                organization_region_id,
                region: request.region,
                last_login_at: None,
                created_at: self.clock.now(),
            };
            if !Scope::for_admin(creator).visible(&candidate) {
                return Err(AppError::Authorization(
                    "Account would fall outside your scope".to_string(),
                ));
            }
        }

        let password_hash = hash_password(&request.password)?;
        let now = self.clock.now();
        let email = request.email.trim().to_lowercase();

        let result = sqlx::query(
            r#"
            INSERT INTO accounts
            (name, email, password_hash, role, organization_id, organization_level_id,
             origin_region_id, origin_district_id, origin_village_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(request.role.as_str())
        .bind(request.organization_id)
        .bind(request.organization_level_id)
        .bind(request.region.origin_region_id)
        .bind(request.region.origin_district_id)
        .bind(request.region.origin_village_id)
        .bind(now)
        .execute(&self.db)
        .await;

        let id = match result {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::Conflict(format!("Email already registered: {}", email)));
            }
            Err(e) => return Err(e.into()),
        };

        metrics::record_account_creation(request.role.as_str());
        tracing::info!(
            "Created {} account {} (id {}){}",
            request.role.as_str(),
            email,
            id,
            creator
                .map(|c| format!(" by account {}", c.id))
                .unwrap_or_default()
        );

        self.get_account(id).await
    }

    /// Create the configured super-admin when no account exists yet
    pub async fn bootstrap(&self, email: &str, password: &str) -> AppResult<Option<Administrator>> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.db)
            .await?;
        if count > 0 {
            return Ok(None);
        }

        let request = CreateAccountRequest {
            name: "Super Admin".to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role: Role::SuperAdmin,
            organization_id: None,
            organization_level_id: None,
            region: RegionAssignment::default(),
        };

        self.create_account(None, &request).await.map(Some)
    }

    pub async fn get_account(&self, id: i64) -> AppResult<Administrator> {
        let sql = format!("{} WHERE s.id = ?", SELECT_ACCOUNT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", id)))?;

        parse_account(&row)
    }

    /// Account lookup through the viewer's scope
    pub async fn get_visible(&self, id: i64, viewer: &Administrator) -> AppResult<Administrator> {
        let account = self.get_account(id).await?;
        if !Scope::for_admin(viewer).visible(&account) {
            metrics::record_scope_denial("account");
            tracing::warn!(
                "Account {} ({}) denied access to account {}",
                viewer.id,
                viewer.role.as_str(),
                id
            );
            return Err(AppError::ScopeDenied(format!("account {}", id)));
        }
        Ok(account)
    }

    /// Scoped account listing
    pub async fn list_accounts(
        &self,
        viewer: &Administrator,
        filter: &AccountFilter,
    ) -> AppResult<Page<Administrator>> {
        let scope = Scope::for_admin(viewer);

        let mut count_qb = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM accounts s LEFT JOIN organizations o ON o.id = s.organization_id WHERE 1 = 1",
        );
        push_account_conditions(&mut count_qb, scope, filter);
        let total = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.db)
            .await?;

        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_ACCOUNT);
        qb.push(" WHERE 1 = 1");
        push_account_conditions(&mut qb, scope, filter);
        qb.push(" ORDER BY s.name, s.id LIMIT ");
        qb.push_bind(filter.per_page() as i64);
        qb.push(" OFFSET ");
        qb.push_bind(filter.offset());

        let rows = qb.build().fetch_all(&self.db).await?;
        let items = rows.iter().map(parse_account).collect::<AppResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total,
            page: filter.page(),
            per_page: filter.per_page(),
        })
    }

    /// Check an email/password pair; `None` when either is wrong
    pub async fn verify_credentials(&self, email: &str, password: &str) -> AppResult<Option<Administrator>> {
        let row = sqlx::query("SELECT id, password_hash FROM accounts WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.db)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row.try_get("id")?;
        let password_hash: String = row.try_get("password_hash")?;

        if !verify_password(password, &password_hash)? {
            return Ok(None);
        }

        self.get_account(id).await.map(Some)
    }

    /// Issue a session and stamp `last_login_at`
    pub async fn create_session(&self, account_id: i64) -> AppResult<Session> {
        let session_id = Uuid::new_v4().to_string();
        let now = self.clock.now();
        let expires_at = now + Duration::seconds(self.config.authentication.access_token_ttl);

        let access_token = self.generate_access_token(account_id, &session_id, now, expires_at)?;

        let mut tx = db::begin_write(&self.db).await?;

        sqlx::query("INSERT INTO sessions (id, account_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
            .bind(&session_id)
            .bind(account_id)
            .bind(now)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE accounts SET last_login_at = ? WHERE id = ?")
            .bind(now)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        metrics::SESSIONS_ACTIVE.inc();

        Ok(Session {
            id: session_id,
            account_id,
            access_token,
            created_at: now,
            expires_at,
        })
    }

    /// Validate access token and return the session's account
    pub async fn validate_access_token(&self, token: &str) -> AppResult<ValidatedSession> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the service clock below
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!("Rejected bearer token: {}", e);
            AppError::Authentication("Invalid token".to_string())
        })?
        .claims;

        let now = self.clock.now();
        if claims.exp <= now.timestamp() {
            return Err(AppError::Authentication("Session expired".to_string()));
        }

        let row = sqlx::query("SELECT account_id, expires_at FROM sessions WHERE id = ?")
            .bind(&claims.jti)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid or expired session".to_string()))?;

        let account_id: i64 = row.try_get("account_id")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;

        if account_id.to_string() != claims.sub {
            return Err(AppError::Authentication("Invalid token".to_string()));
        }
        if now >= expires_at {
            return Err(AppError::Authentication("Session expired".to_string()));
        }

        let account = self.get_account(account_id).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::Authentication("Account no longer exists".to_string()),
            other => other,
        })?;

        Ok(ValidatedSession {
            session_id: claims.jti,
            account,
        })
    }

    /// Delete a session (logout)
    pub async fn delete_session(&self, session_id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() > 0 {
            metrics::SESSIONS_ACTIVE.dec();
        }

        Ok(())
    }

    /// Regency of an organization; unknown organizations are a validation error
    async fn organization_region(&self, organization_id: i64) -> AppResult<Option<i64>> {
        let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT region_id FROM organizations WHERE id = ?")
            .bind(organization_id)
            .fetch_optional(&self.db)
            .await?;

        row.map(|(region_id,)| region_id)
            .ok_or_else(|| AppError::Validation(format!("Unknown organization: {}", organization_id)))
    }

    fn generate_access_token(
        &self,
        account_id: i64,
        session_id: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<String> {
        let claims = Claims {
            sub: account_id.to_string(),
            jti: session_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| AppError::Internal(format!("Stored password hash is unreadable: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn push_account_conditions(qb: &mut QueryBuilder<'_, Sqlite>, scope: Scope, filter: &AccountFilter) {
    scope.push_filter(qb, ScopeColumns::default());

    if let Some(role) = filter.role {
        qb.push(" AND s.role = ");
        qb.push_bind(role.as_str());
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        qb.push(" AND (s.name LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR s.email LIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
}

fn parse_account(row: &SqliteRow) -> AppResult<Administrator> {
    Ok(Administrator {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: Role::from_str(&row.try_get::<String, _>("role")?)?,
        organization_id: row.try_get("organization_id")?,
        organization_level_id: row.try_get("organization_level_id")?,
        organization_region_id: row.try_get("organization_region_id")?,
        region: RegionAssignment {
            origin_region_id: row.try_get("origin_region_id")?,
            origin_district_id: row.try_get("origin_district_id")?,
            origin_village_id: row.try_get("origin_village_id")?,
        },
        last_login_at: row.try_get("last_login_at")?,
        created_at: row.try_get("created_at")?,
    })
}
