//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods
//! that accept `&PgPool` as the first argument.

pub mod asset_repo;
pub mod job_repo;
pub mod owner_scope_repo;

pub use asset_repo::AssetRepo;
pub use job_repo::JobRepo;
pub use owner_scope_repo::OwnerScopeRepo;
