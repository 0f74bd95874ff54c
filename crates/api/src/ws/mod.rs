//! WebSocket live feed of job events.
//!
//! Clients subscribe at `/ws/jobs` and receive every [`JobEvent`] of their
//! owner scope as a JSON text frame. This is what the client's live-feed
//! monitor listens to once its polling budget is spent.
//!
//! [`JobEvent`]: atelier_events::JobEvent

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
