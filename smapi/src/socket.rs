//! Socket abstraction consumed by the transport layer.
//!
//! The retry protocol only needs four operations — open, send, exact-size
//! receive, close — and a small classification of failures into the
//! recoverable conditions (timeout, not connected, refused) versus
//! everything else. [`TcpSocket`] is the production implementation; tests
//! script their own.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Transport-level failure classes.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SocketError {
    /// The operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// The connection dropped or was never established.
    #[error("not connected")]
    NotConnected,

    /// The server actively refused the connection.
    #[error("connection refused")]
    Refused,

    /// Any other I/O failure.
    #[error(transparent)]
    Io(std::io::Error),
}

impl SocketError {
    /// `true` for the conditions the retry protocol may recover from.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout | Self::NotConnected | Self::Refused)
    }

    /// Classifies an I/O error into the transport failure classes.
    fn classify(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::Timeout,
            ErrorKind::ConnectionRefused => Self::Refused,
            ErrorKind::NotConnected
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => Self::NotConnected,
            _ => Self::Io(e),
        }
    }
}

/// The four socket operations the transport layer uses.
pub trait Socket {
    /// Establishes a fresh connection.
    fn open(&mut self) -> Result<(), SocketError>;

    /// Writes the whole buffer.
    fn send(&mut self, bytes: &[u8]) -> Result<(), SocketError>;

    /// Fills the whole buffer from the stream.
    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), SocketError>;

    /// Tears the connection down. Idempotent.
    fn close(&mut self);
}

/// TCP connection to an SMAPI server.
#[derive(Debug)]
pub struct TcpSocket {
    /// Server host name or address.
    host: String,
    /// Server port.
    port: u16,
    /// Read/write timeout applied to the stream.
    timeout: Option<Duration>,
    /// The live stream, once opened.
    stream: Option<TcpStream>,
}

impl TcpSocket {
    /// Creates an unconnected socket for `host:port`.
    pub const fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            timeout: None,
            stream: None,
        }
    }

    /// Sets the read/write timeout applied after connecting.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The stream, or `NotConnected` when [`open`] has not succeeded.
    ///
    /// [`open`]: Socket::open
    fn stream(&mut self) -> Result<&mut TcpStream, SocketError> {
        self.stream.as_mut().ok_or(SocketError::NotConnected)
    }
}

impl Socket for TcpSocket {
    fn open(&mut self) -> Result<(), SocketError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(SocketError::classify)?;
        stream
            .set_read_timeout(self.timeout)
            .and_then(|()| stream.set_write_timeout(self.timeout))
            .map_err(SocketError::classify)?;
        tracing::debug!(host = %self.host, port = self.port, "connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), SocketError> {
        self.stream()?
            .write_all(bytes)
            .map_err(SocketError::classify)
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), SocketError> {
        self.stream()?
            .read_exact(buf)
            .map_err(SocketError::classify)
    }

    fn close(&mut self) {
        self.stream = None;
    }
}
