//! Client error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::connection::AddressError;
use crate::session::SessionState;
use crate::status::Operation;

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// A remote DAQmx call completed but reported a nonzero status.
///
/// `message` is the text returned by `GetErrorString` for `code`. When that
/// lookup itself fails the message describes the lookup failure instead; the
/// original `code` is always preserved.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{operation} failed with DAQmx status {code}: {message}")]
pub struct RemoteOperationError {
    /// The call that reported the status.
    pub operation: Operation,
    /// Device status code as returned by the server.
    pub code: i32,
    /// Resolved, human-readable description of `code`.
    pub message: String,
}

/// Errors that can occur when using the DAQ client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The device server executed the call and returned a nonzero status.
    #[error(transparent)]
    Remote(#[from] RemoteOperationError),

    /// gRPC transport error (connection failed, TLS error, etc.).
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// gRPC status error (unreachable endpoint, deadline exceeded, reset).
    #[error("gRPC status error: {0}")]
    RpcStatus(#[from] tonic::Status),

    /// Invalid target address.
    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),

    /// The local runtime backing the blocking client could not be built.
    #[error("Failed to start client runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// An operation was requested in a state that does not allow it.
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Rejected operation.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// The server answered with data that contradicts the request.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Invalid acquisition configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Releasing the remote task failed after an earlier failure.
    #[error("{primary} (task release also failed: {teardown})")]
    Teardown {
        /// The failure that ended the session.
        #[source]
        primary: Box<ClientError>,
        /// The failure reported by the release call.
        teardown: Box<ClientError>,
    },
}

impl ClientError {
    /// Returns the device status code if this error came from the server.
    ///
    /// Follows the primary failure through [`ClientError::Teardown`].
    #[must_use]
    pub fn device_code(&self) -> Option<i32> {
        match self {
            Self::Remote(err) => Some(err.code),
            Self::Teardown { primary, .. } => primary.device_code(),
            _ => None,
        }
    }

    /// Returns `true` if the RPC layer failed and no device status exists.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RpcStatus(_) => true,
            Self::Teardown { primary, .. } => primary.is_transport(),
            _ => false,
        }
    }

    /// Combines a primary failure with a failure from releasing the task.
    #[must_use]
    pub fn with_teardown(self, teardown: ClientError) -> Self {
        Self::Teardown {
            primary: Box::new(self),
            teardown: Box::new(teardown),
        }
    }
}
