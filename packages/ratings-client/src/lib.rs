//! Rating-sync service client for Halftone
//!
//! This crate provides a client for the external rating-sync service, the
//! collaborator that scrapes and matches community/critic ratings for a
//! series or an issue. The scheduler in `halftone-server` treats it as an
//! opaque, possibly slow, possibly rate-limited function.
//!
//! # Example
//!
//! ```rust,no_run
//! use halftone_ratings_client::RatingsClient;
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RatingsClient::new("http://localhost:8780", None)?;
//!
//! let sources = vec!["comicrates".to_string(), "inkstand".to_string()];
//! let report = client
//!     .sync_series(Uuid::new_v4(), &sources, false)
//!     .await?;
//!
//! if report.has_data {
//!     println!("ratings updated");
//! } else {
//!     println!("no source matched");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! - `RATINGS_SERVICE_URL`: base URL of the rating service (required)
//! - `RATINGS_SERVICE_API_KEY`: optional API key sent as `X-Api-Key`

mod client;
mod error;
mod models;

pub use client::RatingsClient;
pub use error::{RatingsError, RatingsResult};
pub use models::SyncReport;
