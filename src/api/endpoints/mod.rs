//! API endpoint handlers.
//!
//! One module per resource. Handlers check roles and request bodies, then
//! delegate to the repository, order workflow and validation pipeline.

pub mod auth;
pub mod health;
pub mod medical_codes;
pub mod orders;
pub mod organizations;
pub mod patients;
pub mod pdf;
pub mod users;
