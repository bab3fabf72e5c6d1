//! Domain models for the Halftone server

pub mod catalog;
pub mod job;

pub use catalog::{IssueRecord, ItemKind, WorkItem};
pub use job::{
    Checkpoint, CompletionSummary, JobKind, JobStatus, NewJob, RatingJob, UnmatchedTarget,
};
