//! Background tasks.
//!
//! Each submodule provides a long-running async function intended to be
//! spawned via `tokio::spawn`.

pub mod event_forwarder;
pub mod scheduled_dispatch;
