//! Repositories of indexed datasets and the workspace that tracks them.

pub mod dataset;
pub mod repository;
pub mod workspace;

pub use dataset::Dataset;
pub use repository::{Repository, RepositoryMeta};
pub use workspace::Workspace;
