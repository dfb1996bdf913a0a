use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::AreaConfig;

/// Configuration store for counting areas, keyed by `area_name`.
#[async_trait]
pub trait AreaRepository: Send + Sync {
    /// All areas, sorted by name.
    async fn list_areas(&self) -> RepositoryResult<Vec<AreaConfig>>;

    /// Fails with `NotFound` for an unknown name.
    async fn get_area(&self, area_name: &str) -> RepositoryResult<AreaConfig>;

    /// Insert or replace an area after validating it.
    ///
    /// On replace, the stored `created_at` is kept and `updated_at` is taken
    /// from the new value. Returns the stored record.
    async fn upsert_area(&self, area: AreaConfig) -> RepositoryResult<AreaConfig>;

    /// Fails with `NotFound` for an unknown name.
    async fn delete_area(&self, area_name: &str) -> RepositoryResult<()>;
}
