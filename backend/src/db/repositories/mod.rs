//! Repository implementations.
//!
//! Only the in-memory [`LocalRepository`] ships with the crate. Durable
//! stores implement the same traits outside of it.
pub mod local;

pub use local::LocalRepository;
