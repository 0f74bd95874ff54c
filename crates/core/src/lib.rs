//! Domain types shared by every Atelier crate.
//!
//! Nothing in here performs I/O: the job state machine, submission
//! validation, and the typed error codes surfaced to clients all live
//! here so the store, pipeline, API, and client crates agree on them.

pub mod asset;
pub mod error;
pub mod error_codes;
pub mod job;
pub mod request;
pub mod retry;
pub mod types;
