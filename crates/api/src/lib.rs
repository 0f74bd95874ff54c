//! Atelier API server library.
//!
//! Exposes config, state, error handling, routes, and the WebSocket live
//! feed so the binary and the integration tests share them.

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
