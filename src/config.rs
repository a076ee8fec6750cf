/// Configuration management for the Evalap service
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub login_guard: LoginGuardConfig,
    pub submission: SubmissionConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
    /// Take the client address from X-Forwarded-For (behind a reverse proxy)
    pub trust_forwarded_for: bool,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub access_token_ttl: i64,
    /// Super-admin created on first start when the account table is empty
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<String>,
}

/// Backend for the login attempt store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AttemptStoreBackend {
    Memory,
    Redis { url: String, key_prefix: String },
}

/// Login guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginGuardConfig {
    /// Failed attempts before an address is blocked
    pub max_attempts: u32,
    /// Block window (and attempt counter TTL) in seconds
    pub block_window_secs: u64,
    pub backend: AttemptStoreBackend,
}

impl Default for LoginGuardConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            block_window_secs: 1800,
            backend: AttemptStoreBackend::Memory,
        }
    }
}

/// Submission code configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    pub evaluation_prefix: String,
    pub report_prefix: String,
    /// Random candidates tried before falling back to a counter suffix
    pub max_code_attempts: u32,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            evaluation_prefix: "EVL".to_string(),
            report_prefix: "LPR".to_string(),
            max_code_attempts: 20,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env_or("EVALAP_HOSTNAME", "0.0.0.0");
        let port = env_or("EVALAP_PORT", "8080")
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let version = env_or("EVALAP_VERSION", env!("CARGO_PKG_VERSION"));
        let trust_forwarded_for = env_or("EVALAP_TRUST_FORWARDED_FOR", "false")
            .parse()
            .unwrap_or(false);

        let data_directory: PathBuf = env_or("EVALAP_DATA_DIRECTORY", "./data").into();
        let database = env::var("EVALAP_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("evalap.sqlite"));

        let jwt_secret = env::var("EVALAP_JWT_SECRET")
            .map_err(|_| AppError::Validation("JWT secret required".to_string()))?;
        let access_token_ttl = env_or("EVALAP_ACCESS_TOKEN_TTL", "28800")
            .parse()
            .unwrap_or(28800);
        let bootstrap_admin_email = env::var("EVALAP_BOOTSTRAP_ADMIN_EMAIL").ok();
        let bootstrap_admin_password = env::var("EVALAP_BOOTSTRAP_ADMIN_PASSWORD").ok();

        let guard_defaults = LoginGuardConfig::default();
        let max_attempts = env_or("EVALAP_LOGIN_MAX_ATTEMPTS", "3")
            .parse()
            .unwrap_or(guard_defaults.max_attempts);
        let block_window_secs = env_or("EVALAP_LOGIN_BLOCK_WINDOW", "1800")
            .parse()
            .unwrap_or(guard_defaults.block_window_secs);
        let backend = match env_or("EVALAP_LOGIN_STORE", "memory").to_lowercase().as_str() {
            "memory" => AttemptStoreBackend::Memory,
            "redis" => AttemptStoreBackend::Redis {
                url: env_or("REDIS_URL", "redis://localhost:6379"),
                key_prefix: env_or("EVALAP_LOGIN_KEY_PREFIX", "evalap:"),
            },
            other => {
                return Err(AppError::Validation(format!(
                    "Unknown login store backend: {}",
                    other
                )))
            }
        };

        let submission_defaults = SubmissionConfig::default();
        let evaluation_prefix =
            env_or("EVALAP_EVALUATION_CODE_PREFIX", &submission_defaults.evaluation_prefix);
        let report_prefix = env_or("EVALAP_REPORT_CODE_PREFIX", &submission_defaults.report_prefix);
        let max_code_attempts = env_or("EVALAP_MAX_CODE_ATTEMPTS", "20")
            .parse()
            .unwrap_or(submission_defaults.max_code_attempts);

        let level = env_or("RUST_LOG", "info");
        let json = env_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json");

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
                trust_forwarded_for,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication: AuthConfig {
                jwt_secret,
                access_token_ttl,
                bootstrap_admin_email,
                bootstrap_admin_password,
            },
            login_guard: LoginGuardConfig {
                max_attempts,
                block_window_secs,
                backend,
            },
            submission: SubmissionConfig {
                evaluation_prefix,
                report_prefix,
                max_code_attempts,
            },
            logging: LoggingConfig { level, json },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.access_token_ttl <= 0 {
            return Err(AppError::Validation(
                "Access token TTL must be positive".to_string(),
            ));
        }

        if self.authentication.bootstrap_admin_email.is_some()
            != self.authentication.bootstrap_admin_password.is_some()
        {
            return Err(AppError::Validation(
                "Bootstrap admin needs both email and password".to_string(),
            ));
        }

        if self.login_guard.max_attempts == 0 || self.login_guard.block_window_secs == 0 {
            return Err(AppError::Validation(
                "Login guard threshold and window must be non-zero".to_string(),
            ));
        }

        for prefix in [
            &self.submission.evaluation_prefix,
            &self.submission.report_prefix,
        ] {
            if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(AppError::Validation(format!(
                    "Invalid submission code prefix: {:?}",
                    prefix
                )));
            }
        }

        if self.submission.max_code_attempts == 0 {
            return Err(AppError::Validation(
                "Max code attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration suitable for tests: in-memory database, memory store
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 0,
                version: env!("CARGO_PKG_VERSION").to_string(),
                trust_forwarded_for: true,
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                database: PathBuf::from(":memory:"),
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
                access_token_ttl: 3600,
                bootstrap_admin_email: None,
                bootstrap_admin_password: None,
            },
            login_guard: LoginGuardConfig::default(),
            submission: SubmissionConfig::default(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ServerConfig::for_tests().validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = ServerConfig::for_tests();
        config.authentication.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_prefix_rejected() {
        let mut config = ServerConfig::for_tests();
        config.submission.report_prefix = "LP-R".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_half_bootstrap_rejected() {
        let mut config = ServerConfig::for_tests();
        config.authentication.bootstrap_admin_email = Some("root@example.org".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_guard_defaults() {
        let guard = LoginGuardConfig::default();
        assert_eq!(guard.max_attempts, 3);
        assert_eq!(guard.block_window_secs, 1800);
        assert_eq!(guard.backend, AttemptStoreBackend::Memory);
    }
}
