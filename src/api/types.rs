//! Shared types for the API layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::FromRequest;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::models::{User, UserRole};

/// Failed logins allowed per e-mail inside the window.
const LOGIN_MAX_FAILURES: usize = 5;
const LOGIN_WINDOW_SECS: u64 = 15 * 60;
/// Tracked keys before a sweep; keys are caller-chosen e-mails.
const LOGIN_THROTTLE_CAPACITY: usize = 10_000;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
/// Wraps `CoreState` plus API-specific caches.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub login_throttle: Arc<Mutex<LoginThrottle>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self {
            core,
            login_throttle: Arc::new(Mutex::new(LoginThrottle::new())),
        }
    }

    /// Open a workflow database connection for this request.
    pub fn db(&self) -> Result<rusqlite::Connection, ApiError> {
        self.core.open_db().map_err(ApiError::from)
    }
}

// ═══════════════════════════════════════════════════════════
// Authenticated user: injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// The caller behind a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token_hash: String,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn organization_id(&self) -> Uuid {
        self.user.organization_id
    }

    /// 403 unless the caller holds one of `roles`.
    pub fn require_role(&self, roles: &[UserRole], action: &str) -> Result<(), ApiError> {
        if roles.contains(&self.user.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "role {} may not {action}",
                self.user.role
            )))
        }
    }
}

// ═══════════════════════════════════════════════════════════
// JSON body extractor with structured rejections
// ═══════════════════════════════════════════════════════════

/// `Json<T>` whose malformed-body rejection is a 400 `ApiError`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

// ═══════════════════════════════════════════════════════════
// Login throttle: sliding window of failed attempts
// ═══════════════════════════════════════════════════════════

/// Counts failed logins per key (lower-cased e-mail).
pub struct LoginThrottle {
    failures: HashMap<String, Vec<Instant>>,
    max_failures: usize,
    window: Duration,
    capacity: usize,
}

impl LoginThrottle {
    pub fn new() -> Self {
        Self {
            failures: HashMap::new(),
            max_failures: LOGIN_MAX_FAILURES,
            window: Duration::from_secs(LOGIN_WINDOW_SECS),
            capacity: LOGIN_THROTTLE_CAPACITY,
        }
    }

    /// `Err(retry_after_secs)` while the key is locked out.
    pub fn check(&mut self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let window = self.window;
        let Some(entries) = self.failures.get_mut(key) else {
            return Ok(());
        };
        entries.retain(|ts| now.duration_since(*ts) < window);
        if entries.len() < self.max_failures {
            return Ok(());
        }
        let oldest = entries.iter().min().copied().unwrap_or(now);
        let retry = window.saturating_sub(now.duration_since(oldest));
        Err(retry.as_secs().max(1))
    }

    pub fn record_failure(&mut self, key: &str) {
        if !self.failures.contains_key(key) && self.failures.len() >= self.capacity {
            self.cleanup();
        }
        self.failures
            .entry(key.to_string())
            .or_default()
            .push(Instant::now());
    }

    pub fn clear(&mut self, key: &str) {
        self.failures.remove(key);
    }

    /// Drop expired attempts, then keys that are not locked out, then the
    /// key with the stalest failure until there is room for one more.
    fn cleanup(&mut self) {
        let now = Instant::now();
        let window = self.window;
        self.failures.retain(|_, entries| {
            entries.retain(|ts| now.duration_since(*ts) < window);
            !entries.is_empty()
        });
        if self.failures.len() >= self.capacity {
            let max_failures = self.max_failures;
            self.failures.retain(|_, entries| entries.len() >= max_failures);
        }
        while self.failures.len() >= self.capacity {
            let stalest = self
                .failures
                .iter()
                .min_by_key(|(_, entries)| entries.iter().max().copied())
                .map(|(key, _)| key.clone());
            match stalest {
                Some(key) => self.failures.remove(&key),
                None => break,
            };
        }
    }
}

impl Default for LoginThrottle {
    fn default() -> Self {
        Self::new()
    }
}
