//! Database repository layer for Halftone
//!
//! Centralizes all database operations into reusable repositories so
//! that SQL stays in one place and services can be tested against
//! in-memory doubles.

pub mod catalog;
pub mod jobs;

pub use catalog::CatalogRepository;
pub use jobs::JobRepository;
