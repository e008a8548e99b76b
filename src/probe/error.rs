use std::time::Duration;

use super::ProbeState;

/// Everything that can go wrong while probing a target.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid probe target `{host}:{port}`: {reason}")]
    InvalidTarget {
        host: String,
        port: u16,
        reason: &'static str,
    },

    #[error("failed to connect to {address}")]
    Connection {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("exchange with {address} failed")]
    Transfer {
        address: String,
        #[source]
        source: TransferFailure,
    },

    #[error("`{operation}` is not allowed while the probe is {state}")]
    InvalidState {
        operation: &'static str,
        state: ProbeState,
    },

    #[error("assertion failed: {0}")]
    Assertion(String),
}

/// Failures while writing the request or reading the response.
#[derive(Debug, thiserror::Error)]
pub enum TransferFailure {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no progress within {0:?}")]
    TimedOut(Duration),

    #[error("peer closed the connection after {received} bytes, before the response was complete")]
    ClosedEarly { received: usize },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("response exceeded the {0} byte limit")]
    TooLarge(usize),
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ProbeError::Transfer {
                source: TransferFailure::TimedOut(_),
                ..
            } => true,
            ProbeError::Connection { source, .. } => source.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}
