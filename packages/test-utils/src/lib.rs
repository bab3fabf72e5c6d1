//! Shared test utilities for the Halftone workspace
//!
//! Provides a wiremock-backed mock of the external rating-sync service so
//! client and scheduler tests can run without network dependencies.

mod ratings;

pub use ratings::MockRatingsServer;
