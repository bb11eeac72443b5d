//! Error types for SMAPI client operations.

use crate::socket::SocketError;

/// Alias for `Result<T, smapi::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by SMAPI calls.
///
/// Recoverable socket conditions are retried inside the transport layer
/// and only surface here once the retry budget is exhausted or the
/// condition is classified fatal.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Opening the server connection failed.
    #[error("connect to SMAPI server failed: {0}")]
    Connect(#[source] SocketError),

    /// The request could not be delivered within the retry budget.
    #[error("request not delivered after {attempts} attempts")]
    WriteFailed {
        /// Send attempts made before giving up.
        attempts: usize,
    },

    /// A socket operation failed with a non-recoverable condition.
    #[error("socket failure: {0}")]
    Socket(#[source] SocketError),

    /// The server declared a response body shorter than the 12-byte
    /// common header.
    #[error("response body of {len} bytes is below the 12-byte minimum")]
    InvalidData {
        /// Declared body length.
        len: usize,
    },

    /// The recovery sub-protocol reported that no response data exists
    /// for the lost request.
    #[error("no response data available for request {request_id}")]
    NoData {
        /// Identifier of the original request.
        request_id: u32,
    },

    /// The recovery sub-protocol itself failed.
    #[error("response recovery failed: return code {return_code}, reason {reason_code}")]
    RecoveryFailed {
        /// Recovery call's return code.
        return_code: u32,
        /// Recovery call's reason code.
        reason_code: u32,
    },

    /// The response body did not decode against the API's field table.
    #[error(transparent)]
    Parse(#[from] smapi_wire::ParseError),

    /// An I/O error from configuration or dump-file handling.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
