//! HTTP API for the order-entry service.
//!
//! Routes are nested under `/api/`. Protected routes pass through
//! Auth → Audit before the handler; registration, login, invitation
//! acceptance and health are public.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer, ApiSession, ServerError};
pub use types::ApiContext;
