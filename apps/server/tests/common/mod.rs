//! Shared test infrastructure for server integration tests

#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::{wait_for_terminal, TestHarness};
pub use mocks::{InMemoryCatalog, InMemoryJobStore, ScriptedOutcome, ScriptedRatings};
