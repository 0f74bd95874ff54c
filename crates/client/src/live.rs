//! Live-feed monitor over the `/ws/jobs` WebSocket.
//!
//! Used once polling has given up on a slow job: it waits for the job's
//! terminal update without issuing any queries, reconnecting with
//! exponential backoff if the connection drops.

use std::time::Duration;

use async_trait::async_trait;
use atelier_core::retry::Backoff;
use atelier_core::types::DbId;
use atelier_events::JobEvent;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::api::{AtelierApi, OWNER_SCOPE_HEADER};
use crate::error::ClientError;
use crate::poller::TerminalWatch;

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Subscriber to one owner scope's job events.
pub struct LiveMonitor {
    ws_url: String,
    owner_scope: DbId,
    reconnect: Backoff,
}

impl LiveMonitor {
    /// * `ws_url` - full feed URL, e.g. `ws://host:3000/ws/jobs`.
    pub fn new(ws_url: impl Into<String>, owner_scope: DbId) -> Self {
        Self {
            ws_url: ws_url.into(),
            owner_scope,
            reconnect: Backoff::Exponential {
                initial: Duration::from_secs(1),
                multiplier: 2.0,
                max: Duration::from_secs(30),
            },
        }
    }

    /// Monitor for the same server and scope as `api`.
    pub fn for_api(api: &AtelierApi) -> Self {
        Self::new(api.live_feed_url(), api.owner_scope())
    }

    pub fn with_reconnect(mut self, backoff: Backoff) -> Self {
        self.reconnect = backoff;
        self
    }

    /// Open the feed. A 4xx on the upgrade (bad scope) is an API error;
    /// anything else is a connection error.
    pub async fn connect(&self) -> Result<FeedStream, ClientError> {
        let mut request = self
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Connection(format!("Invalid feed URL {}: {e}", self.ws_url)))?;
        request
            .headers_mut()
            .insert(OWNER_SCOPE_HEADER, HeaderValue::from(self.owner_scope));

        match connect_async(request).await {
            Ok((stream, _response)) => {
                tracing::debug!(url = %self.ws_url, owner_scope = self.owner_scope, "Live feed connected");
                Ok(stream)
            }
            Err(tungstenite::Error::Http(response)) if response.status().is_client_error() => {
                Err(ClientError::Api {
                    status: response.status().as_u16(),
                    code: "FEED_REJECTED".to_string(),
                    message: format!("Live feed refused the upgrade at {}", self.ws_url),
                })
            }
            Err(e) => Err(ClientError::Connection(format!(
                "Failed to connect to {}: {e}",
                self.ws_url
            ))),
        }
    }

    /// Wait for the terminal event of `job_id`.
    ///
    /// Returns `Ok(None)` if `cancel` fires first. Dropped connections are
    /// re-established with backoff; a refused upgrade is returned as an
    /// error.
    pub async fn wait_for_terminal(
        &self,
        job_id: DbId,
        cancel: &CancellationToken,
    ) -> Result<Option<JobEvent>, ClientError> {
        let mut failures = 0u32;

        loop {
            let connected = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                result = self.connect() => result,
            };

            match connected {
                Ok(mut stream) => {
                    failures = 0;
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(None),
                        event = next_terminal(&mut stream, job_id) => {
                            if let Some(event) = event {
                                return Ok(Some(event));
                            }
                        }
                    }
                    tracing::info!(job_id, "Live feed closed, reconnecting");
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => tracing::warn!(job_id, error = %e, "Live feed unavailable"),
            }

            failures += 1;
            let delay = self.reconnect.delay_for(failures);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[async_trait]
impl TerminalWatch for LiveMonitor {
    async fn wait_terminal(&self, job_id: DbId, cancel: &CancellationToken) -> Result<(), ClientError> {
        self.wait_for_terminal(job_id, cancel).await.map(|_| ())
    }
}

/// Read frames until `job_id` reports a terminal status. `None` when the
/// stream ends or errors first.
async fn next_terminal(stream: &mut FeedStream, job_id: DbId) -> Option<JobEvent> {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(job_id, error = %e, "Live feed read error");
                return None;
            }
        };

        match parse_event(&text) {
            Ok(event) if event.job_id == job_id && event.is_terminal() => return Some(event),
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Ignoring unreadable live-feed frame"),
        }
    }
    None
}

fn parse_event(text: &str) -> Result<JobEvent, ClientError> {
    serde_json::from_str(text).map_err(|e| ClientError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use atelier_core::job::JobStatus;

    use super::*;

    #[test]
    fn parses_feed_frames() {
        let event = parse_event(
            r#"{"type":"job.update","job_id":7,"owner_scope":1,"status":"done","result":[3,4],"timestamp":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(event.job_id, 7);
        assert_eq!(event.status, JobStatus::Done);
        assert_eq!(event.result, Some(vec![3, 4]));

        assert!(matches!(parse_event("not json"), Err(ClientError::Protocol(_))));
    }
}
