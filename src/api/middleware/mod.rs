//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Auth validator: bearer token to `AuthUser`
//! 2. Audit logger: logs after auth, has the user id

pub mod audit;
pub mod auth;
