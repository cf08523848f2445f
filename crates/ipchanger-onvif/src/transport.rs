//! Authenticated HTTP transport for the ONVIF device service

use async_trait::async_trait;
use ipchanger_core::{Credentials, FailureReason};
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

use crate::envelope::{Envelope, Operation};

/// Fixed management path on every device
pub const DEVICE_SERVICE_PATH: &str = "/onvif/device_service";

/// The only content type we send
pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Device-service endpoint of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }

    /// `http://<ip>[:port]/onvif/device_service`
    pub fn url(&self) -> String {
        if self.port == 80 {
            format!("http://{}{}", self.address, DEVICE_SERVICE_PATH)
        } else {
            format!("http://{}:{}{}", self.address, self.port, DEVICE_SERVICE_PATH)
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// One request to a device
#[derive(Debug, Clone)]
pub struct OnvifRequest {
    pub endpoint: Endpoint,
    pub envelope: Envelope,
    /// `None` sends the request unauthenticated
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
}

impl OnvifRequest {
    pub fn operation(&self) -> Operation {
        self.envelope.operation
    }
}

/// Raw device answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnvifResponse {
    pub status: u16,
    pub body: String,
}

impl OnvifResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Transport failures.
///
/// `Timeout` and `Unreachable` may mean a mutation already took effect (the
/// device dropped off its old address); `Other` is a hard failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {0} timed out")]
    Timeout(Endpoint),
    #[error("Cannot connect to {endpoint}: {message}")]
    Unreachable { endpoint: Endpoint, message: String },
    #[error("Request to {endpoint} failed: {message}")]
    Other { endpoint: Endpoint, message: String },
}

impl TransportError {
    /// Whether the device may have applied the request anyway
    pub fn may_have_applied(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unreachable { .. })
    }

    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::Timeout(_) => FailureReason::TransportTimeout,
            Self::Unreachable { .. } => FailureReason::TransportUnreachable,
            Self::Other { message, .. } => FailureReason::TransportOther(message.clone()),
        }
    }
}

/// Sends one envelope and returns the raw answer. No retries at this layer.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OnvifRequest) -> Result<OnvifResponse, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .user_agent(concat!("ipchanger/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &OnvifRequest) -> Result<OnvifResponse, TransportError> {
        let endpoint = request.endpoint;

        trace!(
            endpoint = %endpoint,
            operation = ?request.operation(),
            body = %request.envelope.body,
            "Sending ONVIF request"
        );

        let mut builder = self
            .client
            .post(endpoint.url())
            .header(reqwest::header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .header("SOAPAction", "")
            .timeout(request.timeout)
            .body(request.envelope.body.clone());

        if let Some(credentials) = &request.credentials {
            builder = builder.basic_auth(credentials.username(), Some(credentials.secret()));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(endpoint, &e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(endpoint, &e))?;

        debug!(
            endpoint = %endpoint,
            operation = ?request.operation(),
            status = status,
            body_len = body.len(),
            "Received ONVIF response"
        );
        trace!(endpoint = %endpoint, body = %body, "ONVIF response body");

        Ok(OnvifResponse { status, body })
    }
}

fn classify(endpoint: Endpoint, err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(endpoint)
    } else if err.is_connect() {
        TransportError::Unreachable {
            endpoint,
            message: err.to_string(),
        }
    } else {
        TransportError::Other {
            endpoint,
            message: err.to_string(),
        }
    }
}
