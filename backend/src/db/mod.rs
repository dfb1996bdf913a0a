//! Persistence boundary for counting events and area definitions.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  services (CameraStream, CountingService)    │
//! └──────────────────┬───────────────────────────┘
//!                    │ Arc<dyn FullRepository>
//! ┌──────────────────▼───────────────────────────┐
//! │  repository traits                           │
//! │  EventRepository + AreaRepository            │
//! └──────────────────┬───────────────────────────┘
//!                    │
//! ┌──────────────────▼───────────────────────────┐
//! │  LocalRepository (in-memory)                 │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The core treats every call as blocking but bounded. A failed insert is
//! logged and retried by the caller; the in-memory counts are never rolled
//! back.

#[cfg(not(feature = "local-repo"))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod repositories;
pub mod repository;

pub use factory::{RepositoryFactory, RepositoryType};
pub use repositories::LocalRepository;
pub use repository::{
    AreaRepository, ErrorContext, EventCounts, EventRepository, FullRepository, RepositoryError,
    RepositoryResult,
};
