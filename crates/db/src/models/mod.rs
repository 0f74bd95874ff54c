//! Row structs mapping the database tables.
//!
//! Each row struct derives `FromRow` and converts into the matching
//! `atelier_core` domain type, rejecting rows whose columns disagree with
//! the job state machine.

pub mod asset;
pub mod job;
pub mod owner_scope;
