//! Client side of the Atelier job pipeline.
//!
//! - [`AtelierApi`] talks to the HTTP API on behalf of one owner scope.
//! - [`StatusPoller`] follows a submitted job to a terminal state and
//!   resolves its result assets, absorbing store lag and transient errors.
//! - [`LiveMonitor`] subscribes to the WebSocket job feed and is the
//!   slow path once the poller's attempt budget is spent.

pub mod api;
pub mod error;
pub mod live;
pub mod poller;

pub use api::{AtelierApi, CancelResult, DispatchResult};
pub use error::ClientError;
pub use live::LiveMonitor;
pub use poller::{JobStatusSource, PollConfig, PollOutcome, StatusPoller, TerminalWatch};
