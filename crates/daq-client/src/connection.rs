//! Device server addressing and gRPC channel settings.
//!
//! Targets are accepted the way operators type them (`pxi-chassis:31763`,
//! `10.0.0.7`, `http://daq.lab`) and turned into a full URL with scheme and
//! port before a channel is opened. The NI gRPC Device Server listens on
//! [`DEFAULT_GRPC_PORT`] unless configured otherwise, so that port is filled
//! in when none is given. Channels are plaintext; `https` targets are rejected.
//!
//! ```
//! use daq_client::connection::DeviceAddress;
//!
//! let addr: DeviceAddress = "192.168.1.40".parse()?;
//! assert_eq!(addr.as_str(), "http://192.168.1.40:31763/");
//! assert_eq!(addr.port(), 31763);
//! # Ok::<(), daq_client::connection::AddressError>(())
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Default port of the NI gRPC Device Server.
pub const DEFAULT_GRPC_PORT: u16 = 31763;

/// gRPC channel configuration.
///
/// Requests are short control calls except `ReadAnalogF64`, which may block
/// on the server for the configured read timeout. Reads therefore get their
/// own deadline: the read timeout plus `read_deadline_margin`.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Time allowed to establish the HTTP/2 connection
    pub connect_timeout: Duration,
    /// Deadline for every call except reads
    pub request_timeout: Duration,
    /// Slack added on top of the server-side read timeout
    pub read_deadline_margin: Duration,
    /// Interval between HTTP/2 keepalive pings
    pub keepalive_interval: Duration,
    /// Time to wait for a keepalive acknowledgement
    pub keepalive_timeout: Duration,
    /// Ping even when no call is in flight
    pub keepalive_while_idle: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_deadline_margin: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(10),
            keepalive_timeout: Duration::from_secs(60),
            keepalive_while_idle: true,
        }
    }
}

impl ChannelConfig {
    /// Deadline for a read whose server-side timeout is `timeout_secs`.
    ///
    /// A negative timeout asks the server to wait forever, so no deadline is set.
    /// Timeouts too large to represent as a deadline are treated the same way.
    #[must_use]
    pub fn read_deadline(&self, timeout_secs: f64) -> Option<Duration> {
        if timeout_secs < 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(timeout_secs)
            .ok()?
            .checked_add(self.read_deadline_margin)
    }
}

/// Rejected device server target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Nothing but whitespace was given
    #[error("Device server address is empty")]
    EmptyInput,
    /// The target could not be parsed as a URL
    #[error("Malformed device server address: {0}")]
    InvalidUrl(String),
    /// The URL has no host component
    #[error("Device server address has no host")]
    MissingHost,
    /// The URL cannot carry a port
    #[error("Cannot use port with this address: {0}")]
    InvalidPort(String),
    /// Scheme other than http
    #[error("Scheme '{0}' is not supported for gRPC (expected http)")]
    UnsupportedScheme(String),
}

/// Normalized device server target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    url: Url,
    input: String,
}

impl DeviceAddress {
    /// Parse and normalize an operator-supplied target.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        Ok(Self {
            url: normalize_url(input)?,
            input: input.trim().to_string(),
        })
    }

    /// Full URL passed to the gRPC endpoint.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Target as typed, before normalization.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.input
    }

    /// Host name or IP literal.
    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Port, explicit or defaulted.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.url.port().unwrap_or(DEFAULT_GRPC_PORT)
    }
}

impl FromStr for DeviceAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Turn a target into a URL with an http scheme and an explicit port.
///
/// ```
/// use daq_client::connection::normalize_url;
///
/// assert_eq!(normalize_url("daq-pxi:5001")?.as_str(), "http://daq-pxi:5001/");
/// assert_eq!(normalize_url("http://daq.lab")?.as_str(), "http://daq.lab:31763/");
/// assert!(normalize_url("https://daq.lab").is_err());
/// # Ok::<(), daq_client::connection::AddressError>(())
/// ```
pub fn normalize_url(input: &str) -> Result<Url, AddressError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AddressError::EmptyInput);
    }

    let candidate = match trimmed.split_once("://") {
        Some(_) => trimmed.to_string(),
        None => format!("http://{trimmed}"),
    };
    let mut url = Url::parse(&candidate).map_err(|e| AddressError::InvalidUrl(e.to_string()))?;

    match url.scheme() {
        "http" => {}
        other => return Err(AddressError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(AddressError::MissingHost);
    }
    if url.port().is_none() {
        url.set_port(Some(DEFAULT_GRPC_PORT))
            .map_err(|()| AddressError::InvalidPort(trimmed.to_string()))?;
    }

    Ok(url)
}
