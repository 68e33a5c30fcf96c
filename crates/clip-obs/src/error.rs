use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObsError {
    /// Transport failure while opening the connection or before Ready.
    #[error("failed to connect to OBS: {0}")]
    Connection(String),

    #[error("OBS did not finish the handshake within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("not connected to OBS")]
    NotConnected,

    #[error("OBS request {request_type} ({request_id}) timed out")]
    RequestTimeout {
        request_type: String,
        request_id: String,
    },

    /// OBS answered with `requestStatus.result == false`.
    #[error("OBS request {request_type} failed: {reason}")]
    RequestFailed {
        request_type: String,
        code: Option<u16>,
        reason: String,
    },

    /// The session ended while a request was still waiting for its answer.
    #[error("OBS connection closed: {0}")]
    ConnectionClosed(String),

    #[error("malformed OBS frame: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("OBS response to {request_type} has no {field}")]
    MissingField {
        request_type: &'static str,
        field: &'static str,
    },
}
