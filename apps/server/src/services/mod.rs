//! Service layer for Halftone

pub mod jobs;

pub use jobs::JobService;
