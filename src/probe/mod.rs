//! A raw-socket HTTP client for black-box protocol tests.
//!
//! The request bytes are sent exactly as given, one exchange per connection.
mod client;
mod error;
mod request;
mod response;

pub use client::{BodyCheck, ProbeClient, ProbeTarget};
pub use error::{ProbeError, TransferFailure};
pub use request::{ProbeRequest, RequestBuilder, CRLF};
pub use response::ProbeResponse;

/// Lifecycle of a [`ProbeClient`]. Each client walks it once, front to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Unconfigured,
    Configured,
    Connected,
    RequestSent,
    ResponseReceived,
    Disconnected,
}

impl std::fmt::Display for ProbeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProbeState::Unconfigured => "unconfigured",
            ProbeState::Configured => "configured",
            ProbeState::Connected => "connected",
            ProbeState::RequestSent => "waiting for a response",
            ProbeState::ResponseReceived => "holding a response",
            ProbeState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}
