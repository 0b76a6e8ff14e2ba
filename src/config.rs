use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::MIN_SECRET_LEN;
use crate::pipeline::validation::{DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL, DEFAULT_LLM_TIMEOUT_SECS};

/// Application-level constants
pub const APP_NAME: &str = "radorder";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 3000));
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;
pub const DEFAULT_INVITATION_TTL_HOURS: i64 = 72;
pub const AUDIT_RETENTION_DAYS: i64 = 90;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Cannot determine a data directory; set {0}")]
    NoDataDir(&'static str),
}

/// Hosted model settings. Absent when no API key is configured.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

/// Everything the process needs, read once at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    pub code_database_path: PathBuf,
    pub token_secret: String,
    pub session_ttl_hours: i64,
    pub invitation_ttl_hours: i64,
    /// PBKDF2 work factor for new password hashes.
    pub password_iterations: u32,
    pub llm: Option<LlmConfig>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("code_database_path", &self.code_database_path)
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("llm_model", &self.llm.as_ref().map(|l| l.model.as_str()))
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Build from the process environment. Call after `dotenvy::dotenv()`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let token_secret = get("RADORDER_TOKEN_SECRET").ok_or(ConfigError::Missing("RADORDER_TOKEN_SECRET"))?;
        if token_secret.chars().count() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "RADORDER_TOKEN_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} characters"),
            });
        }

        let bind_addr = parse_or("RADORDER_BIND_ADDR", get("RADORDER_BIND_ADDR"), DEFAULT_BIND_ADDR)?;

        let database_path = match get("RADORDER_DATABASE_PATH") {
            Some(p) => PathBuf::from(p),
            None => app_data_dir()
                .ok_or(ConfigError::NoDataDir("RADORDER_DATABASE_PATH"))?
                .join("radorder.db"),
        };
        let code_database_path = match get("RADORDER_CODE_DATABASE_PATH") {
            Some(p) => PathBuf::from(p),
            None => app_data_dir()
                .ok_or(ConfigError::NoDataDir("RADORDER_CODE_DATABASE_PATH"))?
                .join("medical_codes.db"),
        };

        let session_ttl_hours: i64 = parse_or(
            "RADORDER_SESSION_TTL_HOURS",
            get("RADORDER_SESSION_TTL_HOURS"),
            DEFAULT_SESSION_TTL_HOURS,
        )?;
        if session_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "RADORDER_SESSION_TTL_HOURS",
                reason: "must be positive".into(),
            });
        }

        let llm = match get("RADORDER_LLM_API_KEY") {
            Some(api_key) => Some(LlmConfig {
                api_key,
                base_url: get("RADORDER_LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
                model: get("RADORDER_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                timeout_secs: parse_or(
                    "RADORDER_LLM_TIMEOUT_SECS",
                    get("RADORDER_LLM_TIMEOUT_SECS"),
                    DEFAULT_LLM_TIMEOUT_SECS,
                )?,
            }),
            None => None,
        };

        Ok(Self {
            bind_addr,
            database_path,
            code_database_path,
            token_secret,
            session_ttl_hours,
            invitation_ttl_hours: DEFAULT_INVITATION_TTL_HOURS,
            password_iterations: crate::crypto::PBKDF2_ITERATIONS,
            llm,
        })
    }

    /// Fixture configuration: throwaway paths, fixed secret, cheap hashing.
    #[cfg(test)]
    pub fn for_tests(dir: &std::path::Path) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_path: dir.join("radorder.db"),
            code_database_path: dir.join("medical_codes.db"),
            token_secret: "test-secret-test-secret-test-secret!".to_string(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            invitation_ttl_hours: DEFAULT_INVITATION_TTL_HOURS,
            password_iterations: 1_000,
            llm: None,
        }
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Default data directory: `<platform data dir>/radorder`.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_NAME))
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    format!("{APP_NAME}=info,tower_http=info")
}
