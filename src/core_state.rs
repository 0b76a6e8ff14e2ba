//! Process-wide application state shared by every request handler.
//!
//! Holds the startup configuration, the validation pipeline, the token
//! hasher and a buffered audit logger. Database connections are opened per
//! call; nothing here holds a connection across requests.

use std::sync::{Arc, Mutex};

use crate::config::{AppConfig, AUDIT_RETENTION_DAYS};
use crate::crypto::{generate_token, hash_password_with, CryptoError, TokenHasher};
use crate::db;
use crate::pipeline::validation::{
    CodeDatabase, DictationValidator, HttpLlmClient, SharedLlmClient, ValidationError,
};

/// Maximum audit buffer size before flush.
const AUDIT_BUFFER_CAPACITY: usize = 100;

pub struct CoreState {
    pub config: AppConfig,
    validator: Arc<DictationValidator>,
    tokens: TokenHasher,
    /// Verified against when a login names no usable account, so every
    /// rejected login costs one PBKDF2 derivation.
    dummy_password_hash: String,
    audit: AuditLogger,
}

impl CoreState {
    /// Build state from configuration: prepares both database files and the
    /// LLM client.
    ///
    /// Constructs a blocking HTTP client; call outside the async runtime.
    pub fn new(config: AppConfig) -> Result<Self, CoreError> {
        let llm: Option<SharedLlmClient> = match &config.llm {
            Some(llm) => {
                let client = HttpLlmClient::new(&llm.base_url, &llm.api_key, &llm.model, llm.timeout_secs)
                    .map_err(CoreError::Llm)?;
                tracing::info!(model = client.model(), "LLM validation enabled");
                Some(Arc::new(client))
            }
            None => {
                tracing::warn!("RADORDER_LLM_API_KEY not set, dictations use rule-based validation");
                None
            }
        };

        let code_db = CodeDatabase::File(config.code_database_path.clone());
        Self::with_validator(config, DictationValidator::new(llm, code_db))
    }

    /// Build state around an existing validator (tests inject mock clients).
    pub fn with_validator(config: AppConfig, validator: DictationValidator) -> Result<Self, CoreError> {
        for path in [&config.database_path, &config.code_database_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // Opening runs migrations and seeds the reference data.
        db::open_database(&config.database_path)?;
        db::open_code_database(&config.code_database_path)?;

        Ok(Self {
            tokens: TokenHasher::new(&config.token_secret)?,
            dummy_password_hash: hash_password_with(&generate_token(), config.password_iterations),
            validator: Arc::new(validator),
            audit: AuditLogger::new(),
            config,
        })
    }

    /// Open a workflow database connection.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.config.database_path).map_err(CoreError::Database)
    }

    /// Open a reference code database connection.
    pub fn open_code_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_code_database(&self.config.code_database_path).map_err(CoreError::Database)
    }

    pub fn validator(&self) -> Arc<DictationValidator> {
        Arc::clone(&self.validator)
    }

    pub fn tokens(&self) -> &TokenHasher {
        &self.tokens
    }

    pub fn dummy_password_hash(&self) -> &str {
        &self.dummy_password_hash
    }

    // ── Audit logging ───────────────────────────────────────

    /// Log a request. Auto-flushes to DB when the buffer is full.
    pub fn log_access(&self, user_id: Option<&str>, action: &str, entity: &str) {
        let needs_flush = self.audit.log(user_id, action, entity);
        if needs_flush {
            if let Err(e) = self.flush_and_prune_audit() {
                tracing::warn!("Auto-flush audit failed: {e}");
            }
        }
    }

    /// Get the current audit buffer contents (for testing/flush).
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }

    /// Flush audit buffer to DB and prune entries past retention.
    pub fn flush_and_prune_audit(&self) -> Result<(), CoreError> {
        let conn = self.open_db()?;
        self.audit.flush_to_db(&conn)?;
        if let Err(e) = db::repository::prune_audit_log(&conn, AUDIT_RETENTION_DAYS) {
            tracing::warn!("Failed to prune audit log: {e}");
        }
        Ok(())
    }

    /// Periodic housekeeping: flush the audit buffer and drop expired sessions.
    pub fn run_maintenance(&self) -> Result<usize, CoreError> {
        self.flush_and_prune_audit()?;
        let conn = self.open_db()?;
        let pruned = db::repository::prune_expired_sessions(&conn, &db::repository::utc_now())?;
        if pruned > 0 {
            tracing::info!(pruned, "Expired sessions removed");
        }
        Ok(pruned)
    }
}

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Token configuration error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("LLM client error: {0}")]
    Llm(ValidationError),
}

// ═══════════════════════════════════════════════════════════
// Audit logger
// ═══════════════════════════════════════════════════════════

/// In-memory audit log buffer. Entries are flushed to SQLite
/// when the buffer reaches capacity or on explicit flush.
pub struct AuditLogger {
    buffer: Mutex<Vec<AuditEntry>>,
}

/// A single audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: chrono::NaiveDateTime,
    pub user_id: Option<String>,
    pub action: String,
    pub entity: String,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(AUDIT_BUFFER_CAPACITY)),
        }
    }

    /// Log an access event to the in-memory buffer.
    /// Returns `true` if the buffer has reached flush threshold.
    pub fn log(&self, user_id: Option<&str>, action: &str, entity: &str) -> bool {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.push(AuditEntry {
                timestamp: db::repository::utc_now(),
                user_id: user_id.map(str::to_string),
                action: action.to_string(),
                entity: entity.to_string(),
            });
            buf.len() >= AUDIT_BUFFER_CAPACITY
        } else {
            false
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|mut buf| buf.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    /// Flush buffered entries to SQLite.
    pub fn flush_to_db(&self, conn: &rusqlite::Connection) -> Result<usize, CoreError> {
        let entries = self.drain();
        if entries.is_empty() {
            return Ok(0);
        }

        let tuples: Vec<db::repository::AuditEntry> = entries
            .into_iter()
            .map(|e| {
                (
                    e.timestamp.format(db::repository::DATETIME_FORMAT).to_string(),
                    e.user_id,
                    e.action,
                    e.entity,
                )
            })
            .collect();

        let count = tuples.len();
        db::repository::insert_audit_entries(conn, &tuples)?;

        tracing::debug!(count, "Flushed audit entries to database");
        Ok(count)
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}
