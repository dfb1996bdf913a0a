//! Repository traits for the persistence boundary.
//!
//! The counting core never talks to storage directly. Stream workers hand
//! emitted events to an [`EventRepository`] and the service reads area
//! definitions from an [`AreaRepository`].

use async_trait::async_trait;

pub mod areas;
pub mod error;
pub mod events;

pub use areas::AreaRepository;
pub use error::{ErrorContext, RepositoryError, RepositoryResult};
pub use events::{EventCounts, EventRepository};

/// Everything a counting deployment needs from its store.
#[async_trait]
pub trait FullRepository: EventRepository + AreaRepository {
    /// `Ok(false)` when the store is reachable but not serving.
    async fn health_check(&self) -> RepositoryResult<bool>;
}
