use scytheproto::ProtocolError;
use std::fmt;
use std::time::Duration;

/// Why a request produced no usable Response.
///
/// A Response with `success: false` is not an error at this level; it comes
/// back as `Ok`. Only the typed helpers on [`crate::BridgeClient`] turn it
/// into [`BridgeError::Rejected`].
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("host is not connected")]
    NotConnected,

    #[error("connection to host lost before the response arrived")]
    Disconnected,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("bridge is shut down")]
    Closed,

    #[error("I/O error on {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable response: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("params must be an object, got {0}")]
    InvalidParams(&'static str),

    #[error("{command} failed: {error}")]
    Rejected { command: String, error: String },

    #[error("{command} response is missing `{field}`")]
    MissingData {
        command: String,
        field: &'static str,
    },
}

impl BridgeError {
    pub(crate) fn io(target: impl fmt::Display, source: std::io::Error) -> Self {
        BridgeError::Io {
            target: target.to_string(),
            source,
        }
    }

    /// True when the caller may reasonably try again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BridgeError::NotConnected | BridgeError::Disconnected | BridgeError::Timeout(_)
        )
    }
}
