//! Atelier job event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`JobEvent`]: one observed change of a job's status or progress. The
//!   API forwards these to WebSocket subscribers, which is the live feed
//!   a client falls back to once its polling budget runs out.

pub mod bus;

pub use bus::{EventBus, JobEvent};
