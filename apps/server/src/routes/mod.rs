//! HTTP route handlers for the Halftone server

pub mod events;
pub mod health;
pub mod jobs;

pub use health::{health_router, HealthState};
pub use jobs::{jobs_router, JobsState};
