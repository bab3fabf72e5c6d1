//! Halftone server library
//!
//! Exposes the server's components for use in integration tests and as
//! a library.

pub mod config;
pub mod error;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod sync;

// Re-export commonly used types
pub use error::{ErrorResponse, ServerError, ServerResult};
pub use services::JobService;
