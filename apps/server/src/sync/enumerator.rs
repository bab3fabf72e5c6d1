//! Work item enumeration
//!
//! Resolves a job's kind and target into the concrete list of work
//! items, exactly once, at job creation time. Issue-level jobs exclude
//! numberless issues and order numerically, non-numeric numbers last.

use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::models::{JobKind, WorkItem};

use super::CatalogReader;

/// Resolves job scopes into work item lists.
#[derive(Clone)]
pub struct ItemEnumerator {
    catalog: Arc<dyn CatalogReader>,
}

impl ItemEnumerator {
    pub fn new(catalog: Arc<dyn CatalogReader>) -> Self {
        Self { catalog }
    }

    /// Enumerate the work items for a job scope.
    ///
    /// Returns an empty list when the scope resolves to nothing; the
    /// caller decides whether that is an error (it is, for creation).
    pub async fn enumerate(
        &self,
        kind: JobKind,
        target_id: Option<Uuid>,
    ) -> ServerResult<Vec<WorkItem>> {
        match kind {
            JobKind::Series => {
                let series_id = require_target(kind, target_id)?;
                match self.catalog.series_item(series_id).await? {
                    Some(item) => Ok(vec![item]),
                    None => Err(ServerError::not_found("series", series_id.to_string())),
                }
            }
            JobKind::Library => {
                let library_id = require_target(kind, target_id)?;
                self.catalog.series_in_library(library_id).await
            }
            JobKind::Catalog => self.catalog.all_series().await,
            JobKind::Issues => {
                let series_id = require_target(kind, target_id)?;
                if self.catalog.series_item(series_id).await?.is_none() {
                    return Err(ServerError::not_found("series", series_id.to_string()));
                }

                let mut issues: Vec<_> = self
                    .catalog
                    .issues_of_series(series_id)
                    .await?
                    .into_iter()
                    // Numberless issues cannot be matched against rating
                    // sources and are skipped entirely.
                    .filter(|issue| {
                        issue
                            .number
                            .as_deref()
                            .map(|n| !n.trim().is_empty())
                            .unwrap_or(false)
                    })
                    .collect();

                issues.sort_by(|a, b| {
                    compare_issue_numbers(
                        a.number.as_deref().unwrap_or(""),
                        b.number.as_deref().unwrap_or(""),
                    )
                });

                Ok(issues
                    .into_iter()
                    .map(|issue| {
                        let label = issue.label();
                        WorkItem::issue(issue.id, label)
                    })
                    .collect())
            }
        }
    }
}

fn require_target(kind: JobKind, target_id: Option<Uuid>) -> ServerResult<Uuid> {
    target_id.ok_or_else(|| {
        ServerError::ValidationError(format!("job kind '{}' requires a target_id", kind))
    })
}

/// Numeric-aware ordering for issue numbers.
///
/// Numbers that parse as floats sort numerically ("2" before "10",
/// "1.5" between "1" and "2"); everything else sorts after them,
/// lexicographically. The sort itself is stable, so ties keep their
/// enumeration order.
pub fn compare_issue_numbers(a: &str, b: &str) -> Ordering {
    match (parse_number(a), parse_number(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", "2", Ordering::Less)]
    #[case("2", "10", Ordering::Less)]
    #[case("1.5", "2", Ordering::Less)]
    #[case("1", "1.5", Ordering::Less)]
    #[case("10", "9", Ordering::Greater)]
    #[case("3", "3", Ordering::Equal)]
    #[case("12", "Annual 2021", Ordering::Less)]
    #[case("Annual 2021", "0.1", Ordering::Greater)]
    #[case("Annual 2021", "Special", Ordering::Less)]
    #[case(" 7 ", "8", Ordering::Less)]
    fn issue_number_ordering(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(compare_issue_numbers(a, b), expected);
    }

    #[test]
    fn sorting_puts_non_numeric_last() {
        let mut numbers = vec!["Annual 2021", "10", "2", "1.5", "Special", "1"];
        numbers.sort_by(|a, b| compare_issue_numbers(a, b));
        assert_eq!(numbers, vec!["1", "1.5", "2", "10", "Annual 2021", "Special"]);
    }

    #[test]
    fn infinity_is_treated_as_non_numeric() {
        assert_eq!(compare_issue_numbers("1", "inf"), Ordering::Less);
        assert_eq!(compare_issue_numbers("nan", "0"), Ordering::Greater);
    }
}
