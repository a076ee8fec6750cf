/// Application context and dependency injection
use crate::{
    account::AccountManager,
    clock::{Clock, SystemClock},
    config::{AttemptStoreBackend, ServerConfig},
    dashboard::Dashboard,
    db,
    error::{AppError, AppResult},
    guard::{AttemptStore, LoginGuard, MemoryAttemptStore, RedisAttemptStore},
    submission::{EvaluationManager, PeriodManager, ReportManager, SubmissionWorkflow},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub clock: Arc<dyn Clock>,
    pub account_manager: Arc<AccountManager>,
    pub login_guard: Arc<LoginGuard>,
    // Submissions
    pub evaluation_manager: Arc<EvaluationManager>,
    pub report_manager: Arc<ReportManager>,
    pub period_manager: Arc<PeriodManager>,
    pub dashboard: Arc<Dashboard>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        config.validate()?;

        let db = if config.storage.database.as_os_str() == ":memory:" {
            db::memory_pool().await?
        } else {
            Self::ensure_directories(&config).await?;
            let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
            db::run_migrations(&pool).await?;
            pool
        };
        db::test_connection(&db).await?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store: Arc<dyn AttemptStore> = match &config.login_guard.backend {
            AttemptStoreBackend::Memory => {
                tracing::warn!("Login attempts are kept in process memory; blocks reset on restart");
                Arc::new(MemoryAttemptStore::new(clock.clone()))
            }
            AttemptStoreBackend::Redis { url, key_prefix } => {
                let store = RedisAttemptStore::connect(url, key_prefix).await?;
                store.ping().await?;
                tracing::info!("Login attempt store connected to Redis");
                Arc::new(store)
            }
        };

        let ctx = Self::with_components(config, db, store, clock);

        if let (Some(email), Some(password)) = (
            ctx.config.authentication.bootstrap_admin_email.as_deref(),
            ctx.config.authentication.bootstrap_admin_password.as_deref(),
        ) {
            if let Some(admin) = ctx.account_manager.bootstrap(email, password).await? {
                tracing::info!("Bootstrapped super admin {}", admin.email);
            }
        }

        Ok(ctx)
    }

    /// Assemble the services around an existing pool, store and clock
    pub fn with_components(
        config: ServerConfig,
        db: SqlitePool,
        store: Arc<dyn AttemptStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = Arc::new(config);

        let workflow = SubmissionWorkflow::new(db.clone(), clock.clone(), config.submission.clone());

        Self {
            account_manager: Arc::new(AccountManager::new(db.clone(), config.clone(), clock.clone())),
            login_guard: Arc::new(LoginGuard::new(store, clock.clone(), config.login_guard.clone())),
            evaluation_manager: Arc::new(EvaluationManager::new(workflow.clone())),
            report_manager: Arc::new(ReportManager::new(workflow)),
            period_manager: Arc::new(PeriodManager::new(db.clone())),
            dashboard: Arc::new(Dashboard::new(db.clone())),
            config,
            db,
            clock,
        }
    }

    async fn ensure_directories(config: &ServerConfig) -> AppResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }
        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
