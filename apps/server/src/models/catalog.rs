//! Catalog types consumed by the rating sync pipeline

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a single work item refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Series,
    Issue,
}

/// A single unit of work inside a rating sync job.
///
/// Items are enumerated once when the job is created and stored with the
/// job row, so every run of the job (including a crash-recovered one)
/// processes exactly the same set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub name: String,
    pub kind: ItemKind,
}

impl WorkItem {
    pub fn series(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ItemKind::Series,
        }
    }

    pub fn issue(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ItemKind::Issue,
        }
    }
}

/// Raw issue row used by the enumerator before sorting and filtering.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IssueRecord {
    pub id: Uuid,
    pub series_name: String,
    pub number: Option<String>,
}

impl IssueRecord {
    /// Display label for the issue, e.g. "Saga #12".
    pub fn label(&self) -> String {
        match &self.number {
            Some(number) => format!("{} #{}", self.series_name, number),
            None => self.series_name.clone(),
        }
    }
}
