use std::fmt;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;
use uuid::Uuid;

use super::error::{ProbeError, TransferFailure};
use super::request::ProbeRequest;
use super::response::{Parsed, ProbeResponse, ResponseReader};
use super::ProbeState;
use crate::configuration::ProbeSettings;

const READ_CHUNK: usize = 4096;

/// Where a probe connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    host: String,
    port: u16,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ProbeError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ProbeError::InvalidTarget {
                host,
                port,
                reason: "host must not be empty",
            });
        }
        if port == 0 {
            return Err(ProbeError::InvalidTarget {
                host,
                port,
                reason: "port must be between 1 and 65535",
            });
        }
        Ok(Self { host, port })
    }

    /// Takes host and port from a deployment's base URL; everything else in
    /// the URL is ignored.
    pub fn from_url(url: &Url) -> Result<Self, ProbeError> {
        let host = match url.host() {
            Some(url::Host::Ipv6(address)) => address.to_string(),
            Some(host) => host.to_string(),
            None => String::new(),
        };
        let port = url.port_or_known_default().unwrap_or(0);
        Self::new(host, port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

type BodyPredicate = Box<dyn Fn(&ProbeResponse) -> bool + Send + Sync>;

/// How [`ProbeClient::is_response_body_ok`] judges a response body.
pub enum BodyCheck {
    /// Any body passes.
    AcceptAny,
    Predicate(BodyPredicate),
}

impl BodyCheck {
    pub fn predicate<F>(check: F) -> Self
    where
        F: Fn(&ProbeResponse) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Box::new(check))
    }

    fn accepts(&self, response: &ProbeResponse) -> bool {
        match self {
            BodyCheck::AcceptAny => true,
            BodyCheck::Predicate(check) => check(response),
        }
    }
}

impl fmt::Debug for BodyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyCheck::AcceptAny => f.write_str("AcceptAny"),
            BodyCheck::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Performs one HTTP exchange over a connection it owns exclusively.
///
/// Either drive the steps by hand (`configure`, `connect`, `set_request`,
/// `send`, `disconnect`) or let [`ProbeClient::exchange`] do it and guarantee
/// the connection is released before the outcome is returned.
#[derive(Debug)]
pub struct ProbeClient {
    settings: ProbeSettings,
    body_check: BodyCheck,
    state: ProbeState,
    target: Option<ProbeTarget>,
    connection: Option<TcpStream>,
    request: Option<ProbeRequest>,
    response: Option<ProbeResponse>,
}

impl ProbeClient {
    pub fn new(settings: ProbeSettings, body_check: BodyCheck) -> Self {
        Self {
            settings,
            body_check,
            state: ProbeState::Unconfigured,
            target: None,
            connection: None,
            request: None,
            response: None,
        }
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn target(&self) -> Option<&ProbeTarget> {
        self.target.as_ref()
    }

    pub fn response(&self) -> Option<&ProbeResponse> {
        self.response.as_ref()
    }

    fn address(&self) -> String {
        self.target
            .as_ref()
            .map_or_else(|| "<unconfigured>".to_string(), ProbeTarget::address)
    }

    fn invalid_state(&self, operation: &'static str) -> ProbeError {
        ProbeError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn require(&self, operation: &'static str, allowed: &[ProbeState]) -> Result<(), ProbeError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    pub fn configure(&mut self, host: impl Into<String>, port: u16) -> Result<(), ProbeError> {
        self.configure_target(ProbeTarget::new(host, port)?)
    }

    pub fn configure_target(&mut self, target: ProbeTarget) -> Result<(), ProbeError> {
        self.require(
            "configure",
            &[ProbeState::Unconfigured, ProbeState::Configured],
        )?;
        self.target = Some(target);
        self.state = ProbeState::Configured;
        Ok(())
    }

    #[tracing::instrument(name = "Connecting probe", skip(self), fields(peer = %self.address()))]
    pub async fn connect(&mut self) -> Result<(), ProbeError> {
        self.require("connect", &[ProbeState::Configured])?;
        let Some(target) = self.target.as_ref() else {
            return Err(self.invalid_state("connect"));
        };
        let address = target.address();
        let limit = self.settings.connect_timeout();

        let stream = match timeout(limit, TcpStream::connect((target.host(), target.port()))).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ProbeError::Connection { address, source }),
            Err(_) => {
                return Err(ProbeError::Connection {
                    address,
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("no connection within {limit:?}"),
                    ),
                })
            }
        };

        tracing::debug!("Probe connected");
        self.connection = Some(stream);
        self.state = ProbeState::Connected;
        Ok(())
    }

    pub fn set_request(&mut self, request: impl Into<ProbeRequest>) -> Result<(), ProbeError> {
        self.require(
            "set_request",
            &[ProbeState::Configured, ProbeState::Connected],
        )?;
        self.request = Some(request.into());
        Ok(())
    }

    pub fn set_request_lines<I, S>(&mut self, lines: I) -> Result<(), ProbeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_request(ProbeRequest::from_lines(lines))
    }

    /// Writes the stored request and waits until a complete response has been
    /// read or the peer hangs up.
    #[tracing::instrument(name = "Sending probe request", skip(self), fields(peer = %self.address()))]
    pub async fn send(&mut self) -> Result<(), ProbeError> {
        self.require("send", &[ProbeState::Connected])?;
        if self.request.is_none() {
            return Err(self.invalid_state("send without a request"));
        }

        let address = self.address();
        self.state = ProbeState::RequestSent;
        let outcome = match (self.connection.as_mut(), self.request.as_ref()) {
            (Some(stream), Some(request)) => transfer(stream, request, &self.settings).await,
            _ => {
                return Err(ProbeError::InvalidState {
                    operation: "send",
                    state: ProbeState::RequestSent,
                })
            }
        };

        match outcome {
            Ok(response) => {
                tracing::info!(
                    status = response.status(),
                    received_bytes = response.raw().len(),
                    "Probe received a response"
                );
                self.response = Some(response);
                self.state = ProbeState::ResponseReceived;
                Ok(())
            }
            Err(source) => {
                tracing::warn!(error = %source, "Probe exchange failed");
                Err(ProbeError::Transfer { address, source })
            }
        }
    }

    /// Closes the connection once `send` has run. Calling it again, or after
    /// [`ProbeClient::exchange`], is a no-op.
    pub async fn disconnect(&mut self) -> Result<(), ProbeError> {
        self.require(
            "disconnect",
            &[
                ProbeState::RequestSent,
                ProbeState::ResponseReceived,
                ProbeState::Disconnected,
            ],
        )?;
        self.release().await;
        Ok(())
    }

    async fn release(&mut self) {
        if let Some(mut stream) = self.connection.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(error = %e, "Probe connection did not shut down cleanly");
            }
            self.state = ProbeState::Disconnected;
        }
    }

    /// Connects, sends `request` and disconnects. The connection is released
    /// on every path before the first failure, if any, is handed back.
    ///
    /// Only a freshly configured client may run an exchange; in any other state
    /// it fails without touching the connection.
    #[tracing::instrument(
        name = "Probe exchange",
        skip(self, request),
        fields(exchange_id = %Uuid::new_v4(), peer = %self.address())
    )]
    pub async fn exchange(&mut self, request: impl Into<ProbeRequest>) -> Result<(), ProbeError> {
        self.require("exchange", &[ProbeState::Configured])?;
        let outcome = self.perform(request.into()).await;
        self.release().await;
        outcome
    }

    async fn perform(&mut self, request: ProbeRequest) -> Result<(), ProbeError> {
        self.connect().await?;
        self.set_request(request)?;
        self.send().await
    }

    pub fn is_response_code(&self, code: u16) -> bool {
        self.response
            .as_ref()
            .is_some_and(|response| response.status() == code)
    }

    pub fn is_response_200(&self) -> bool {
        self.is_response_code(200)
    }

    pub fn is_response_403(&self) -> bool {
        self.is_response_code(403)
    }

    pub fn is_response_body_ok(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|response| self.body_check.accepts(response))
    }

    pub fn expect_response_code(&self, code: u16) -> Result<(), ProbeError> {
        match &self.response {
            Some(response) if response.status() == code => Ok(()),
            Some(response) => Err(ProbeError::Assertion(format!(
                "expected status {code}, got {} {}",
                response.status(),
                response.reason()
            ))),
            None => Err(ProbeError::Assertion(format!(
                "expected status {code}, but no response was received"
            ))),
        }
    }

    pub fn expect_response_body_ok(&self) -> Result<(), ProbeError> {
        match &self.response {
            Some(_) if self.is_response_body_ok() => Ok(()),
            Some(response) => Err(ProbeError::Assertion(format!(
                "response body rejected: {:?}",
                response.body_text()
            ))),
            None => Err(ProbeError::Assertion(
                "no response body to check".to_string(),
            )),
        }
    }
}

async fn transfer(
    stream: &mut TcpStream,
    request: &ProbeRequest,
    settings: &ProbeSettings,
) -> Result<ProbeResponse, TransferFailure> {
    let limit = settings.io_timeout();
    timeout(limit, stream.write_all(request.as_bytes()))
        .await
        .map_err(|_| TransferFailure::TimedOut(limit))??;
    timeout(limit, stream.flush())
        .await
        .map_err(|_| TransferFailure::TimedOut(limit))??;
    tracing::debug!(sent_bytes = request.len(), "Probe request written");

    let mut reader = ResponseReader::new(request.expects_response_body());
    let mut received = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let read = timeout(limit, stream.read(&mut chunk))
            .await
            .map_err(|_| TransferFailure::TimedOut(limit))??;
        let closed = read == 0;
        received.extend_from_slice(&chunk[..read]);
        if received.len() > settings.max_response_bytes {
            return Err(TransferFailure::TooLarge(settings.max_response_bytes));
        }

        match reader.advance(&received, closed)? {
            Parsed::Complete(response) => return Ok(response),
            Parsed::Partial if closed => {
                return Err(TransferFailure::ClosedEarly {
                    received: received.len(),
                })
            }
            Parsed::Partial => {}
        }
    }
}
