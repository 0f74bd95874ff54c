/// Errors from the Atelier client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, body decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-2xx status.
    #[error("API error ({status}, {code}): {message}")]
    Api {
        status: u16,
        /// Machine-readable code from the `{error, code}` body, or
        /// `UNKNOWN` when the body was not in that shape.
        code: String,
        message: String,
    },

    /// The live-feed WebSocket could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A live-feed frame could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether repeating the same call later may succeed.
    ///
    /// Network failures, timeouts, 5xx, 408 and 429 are transient.
    /// Other 4xx answers (not found, unauthorized, validation) are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => !e.is_decode() && !e.is_builder(),
            Self::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Connection(_) => true,
            Self::Protocol(_) => false,
        }
    }

    /// HTTP status of an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> ClientError {
        ClientError::Api {
            status,
            code: "X".into(),
            message: String::new(),
        }
    }

    #[test]
    fn classifies_api_statuses() {
        assert!(api(503).is_transient());
        assert!(api(429).is_transient());
        assert!(!api(404).is_transient());
        assert!(!api(401).is_transient());
        assert_eq!(api(404).status(), Some(404));
    }

    #[test]
    fn connection_drops_are_transient() {
        assert!(ClientError::Connection("reset".into()).is_transient());
        assert!(!ClientError::Protocol("bad frame".into()).is_transient());
    }
}
