//! Catalog repository: read-only queries over libraries, series, issues

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ServerResult;
use crate::models::{IssueRecord, WorkItem};
use crate::sync::CatalogReader;

/// Repository for catalog reads used by job enumeration
#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct SeriesRow {
    id: Uuid,
    name: String,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogReader for CatalogRepository {
    async fn series_item(&self, series_id: Uuid) -> ServerResult<Option<WorkItem>> {
        let row = sqlx::query_as::<_, SeriesRow>("SELECT id, name FROM series WHERE id = $1")
            .bind(series_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| WorkItem::series(r.id, r.name)))
    }

    /// Series with at least one issue in the given library, ordered by name.
    async fn series_in_library(&self, library_id: Uuid) -> ServerResult<Vec<WorkItem>> {
        let rows = sqlx::query_as::<_, SeriesRow>(
            "SELECT DISTINCT s.id, s.name \
             FROM series s \
             JOIN issues i ON i.series_id = s.id \
             WHERE i.library_id = $1 \
             ORDER BY s.name ASC",
        )
        .bind(library_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| WorkItem::series(r.id, r.name))
            .collect())
    }

    async fn all_series(&self) -> ServerResult<Vec<WorkItem>> {
        let rows = sqlx::query_as::<_, SeriesRow>("SELECT id, name FROM series ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| WorkItem::series(r.id, r.name))
            .collect())
    }

    /// All issues of a series, unsorted. Filtering and ordering is the
    /// enumerator's concern.
    async fn issues_of_series(&self, series_id: Uuid) -> ServerResult<Vec<IssueRecord>> {
        let rows = sqlx::query_as::<_, IssueRecord>(
            "SELECT i.id, s.name AS series_name, i.number \
             FROM issues i \
             JOIN series s ON s.id = i.series_id \
             WHERE i.series_id = $1",
        )
        .bind(series_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
