//! Transport layer: request delivery with bounded retry, response
//! reception, and the response-recovery sub-protocol.
//!
//! One call runs synchronously end to end: open a fresh connection, send
//! the encoded request (retrying recoverable socket failures on the fixed
//! back-off schedule), read the request identifier and response length,
//! read the body, then decode it in two passes (scan, allocate, populate).
//! Losing the response after delivery enters recovery: reconnect and ask
//! the server to replay the response for the saved request identifier.

use std::path::PathBuf;
use std::time::Duration;

use smapi_wire::{ErrorBufMode, Field, OutputBuffer, ParseError, Request, populate, scan};

use crate::config::Config;
use crate::dump;
use crate::error::{Error, Result};
use crate::socket::{Socket, TcpSocket};

/// Sleep, in seconds, before each send attempt. The first attempt is
/// immediate; the budget is the schedule's length.
pub const SEND_RETRY_SLEEP_SECS: [u64; 8] = [0, 8, 16, 16, 15, 15, 15, 15];

/// Pause between closing a dead connection and issuing `Response_Recovery`.
const RECOVERY_DELAY: Duration = Duration::from_secs(15);

/// A response body can never be smaller than its 3-int common header.
const MIN_BODY: usize = 12;

/// Decoded response of one call.
#[derive(Debug)]
#[non_exhaustive]
pub struct Response {
    /// Server-assigned request identifier (echoed in the body).
    pub request_id: u32,
    /// Call return code.
    pub return_code: u32,
    /// Call reason code.
    pub reason_code: u32,
    /// Table-decoded output structures and string data.
    pub output: OutputBuffer,
}

/// Verdict of one `Response_Recovery` exchange.
#[derive(Debug)]
enum Recovery {
    /// The original response body was replayed.
    Recovered(Vec<u8>),
    /// The server asked for the whole original request again.
    Retry,
}

/// A client connection to an SMAPI server.
///
/// Each [`call`] opens its own connection and owns its own parse state, so
/// independent clients may run on independent threads; a single `Client`
/// must not be shared across threads mid-call.
///
/// [`call`]: Client::call
#[derive(Debug)]
pub struct Client<S = TcpSocket> {
    /// The (re)openable server connection.
    pub(crate) socket: S,
    /// Per-attempt sleep schedule; its length is the retry budget.
    schedule: Vec<Duration>,
    /// Pause before the recovery sub-protocol reconnects.
    recovery_delay: Duration,
    /// Where diagnostic dumps land; `None` disables dumping.
    dump_dir: Option<PathBuf>,
}

impl Client<TcpSocket> {
    /// Builds a TCP client from connection settings.
    pub fn from_config(config: &Config) -> Self {
        let mut socket = TcpSocket::new(config.host.clone(), config.port);
        if let Some(secs) = config.timeout_secs {
            socket = socket.timeout(Duration::from_secs(secs));
        }
        Self::with_socket(socket).dump_dir(config.dump_dir.clone())
    }
}

impl<S: Socket> Client<S> {
    /// Wraps an already-configured socket with the default retry schedule.
    pub fn with_socket(socket: S) -> Self {
        Self {
            socket,
            schedule: SEND_RETRY_SLEEP_SECS
                .iter()
                .map(|&s| Duration::from_secs(s))
                .collect(),
            recovery_delay: RECOVERY_DELAY,
            dump_dir: Some(std::env::temp_dir()),
        }
    }

    /// Replaces the per-attempt sleep schedule (the length is the budget).
    #[must_use]
    pub fn retry_schedule(mut self, sleeps: &[Duration]) -> Self {
        self.schedule = sleeps.to_vec();
        self
    }

    /// Replaces the pause before recovery reconnects.
    #[must_use]
    pub const fn recovery_delay(mut self, delay: Duration) -> Self {
        self.recovery_delay = delay;
        self
    }

    /// Sets (or disables) the diagnostic dump directory.
    #[must_use]
    pub fn dump_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dump_dir = dir;
        self
    }

    /// Sends one encoded request and decodes its response against `table`.
    pub fn call(
        &mut self,
        function: &'static str,
        request: &[u8],
        table: &'static [Field],
        mode: ErrorBufMode,
    ) -> Result<Response> {
        let mut attempt = 0usize;
        let result = self.drive(function, request, table, mode, &mut attempt);
        self.socket.close();
        result
    }

    /// The state machine proper: Sending → AwaitingRequestId →
    /// AwaitingLength → (recovery) → ReadingBody → Parsing.
    fn drive(
        &mut self,
        function: &'static str,
        request: &[u8],
        table: &'static [Field],
        mode: ErrorBufMode,
        attempt: &mut usize,
    ) -> Result<Response> {
        loop {
            self.deliver(function, request, attempt)?;

            let request_id = match self.read_u32() {
                Ok(v) => v,
                Err(e) if e.is_recoverable() => {
                    // No identifier yet, so nothing to recover against;
                    // the whole request goes again.
                    tracing::warn!(function, error = %e, "request id lost; resending");
                    self.socket.close();
                    continue;
                }
                Err(e) => return Err(Error::Socket(e)),
            };

            let body = match self.read_u32() {
                Ok(len) => self.read_body(len as usize)?,
                Err(e) if e.is_recoverable() => {
                    match self.recover(function, request_id)? {
                        Recovery::Recovered(body) => body,
                        Recovery::Retry => {
                            tracing::warn!(function, request_id, "server asked for a resend");
                            self.socket.close();
                            continue;
                        }
                    }
                }
                Err(e) => return Err(Error::Socket(e)),
            };

            return self.parse(function, &body, table, mode);
        }
    }

    /// Sending state: one successful write, or a recoverable failure
    /// retried on the schedule until the budget runs out.
    fn deliver(
        &mut self,
        function: &'static str,
        request: &[u8],
        attempt: &mut usize,
    ) -> Result<()> {
        loop {
            if *attempt >= self.schedule.len() {
                tracing::error!(function, attempts = *attempt, "retry budget exhausted");
                return Err(Error::WriteFailed { attempts: *attempt });
            }
            let pause = self.schedule[*attempt];
            if !pause.is_zero() {
                tracing::debug!(function, attempt = *attempt, ?pause, "backing off");
                std::thread::sleep(pause);
            }
            *attempt += 1;

            match self.open_and_send(request) {
                Ok(()) => return Ok(()),
                Err(Error::Socket(e)) if e.is_recoverable() => {
                    tracing::warn!(function, attempt = *attempt, error = %e, "send failed");
                    self.socket.close();
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Connecting + Sending for one attempt.
    fn open_and_send(&mut self, request: &[u8]) -> Result<()> {
        self.socket.open().map_err(Error::Connect)?;
        self.socket.send(request).map_err(Error::Socket)
    }

    /// ReadingBody state: the declared length must cover the common
    /// header, then the body is read exactly.
    fn read_body(&mut self, len: usize) -> Result<Vec<u8>> {
        if len < MIN_BODY {
            return Err(Error::InvalidData { len });
        }
        let mut body = vec![0u8; len];
        self.socket.recv_exact(&mut body).map_err(Error::Socket)?;
        Ok(body)
    }

    /// Response-recovery sub-protocol: reconnect after a pause and ask the
    /// server to replay the response for `request_id`. The recovery call's
    /// own return code selects the verdict: 0 = body replayed, 4 = retry
    /// the original request, 8 = no data (terminal); anything else is the
    /// recovery failure itself.
    fn recover(&mut self, function: &'static str, request_id: u32) -> Result<Recovery> {
        tracing::warn!(function, request_id, "response lost; starting recovery");
        self.socket.close();
        if !self.recovery_delay.is_zero() {
            std::thread::sleep(self.recovery_delay);
        }

        let recovery = Request::new("Response_Recovery").int4(request_id).encode();
        self.socket.open().map_err(Error::Connect)?;
        self.socket.send(&recovery).map_err(Error::Socket)?;

        let _recovery_id = self.read_u32().map_err(Error::Socket)?;
        let len = self.read_u32().map_err(Error::Socket)? as usize;
        let body = self.read_body(len)?;

        let return_code = read_be32(&body[4..8]);
        let reason_code = read_be32(&body[8..12]);
        match return_code {
            0 => {
                // The original body, header included, follows the
                // recovery header.
                let original = body[MIN_BODY..].to_vec();
                if original.len() < MIN_BODY {
                    return Err(Error::InvalidData {
                        len: original.len(),
                    });
                }
                tracing::debug!(function, request_id, "response recovered");
                Ok(Recovery::Recovered(original))
            }
            4 => Ok(Recovery::Retry),
            8 => Err(Error::NoData { request_id }),
            _ => Err(Error::RecoveryFailed {
                return_code,
                reason_code,
            }),
        }
    }

    /// Parsing state: scan, allocate exactly, populate. A string-size
    /// mismatch dumps the raw body for postmortem before propagating.
    fn parse(
        &self,
        function: &'static str,
        body: &[u8],
        table: &'static [Field],
        mode: ErrorBufMode,
    ) -> Result<Response> {
        let sizes = match scan(table, body, mode) {
            Ok(s) => s,
            Err(e) => return Err(self.parse_failure(function, body, e)),
        };
        let mut output = OutputBuffer::allocate(&sizes);
        if let Err(e) = populate(table, body, mode, &mut output) {
            return Err(self.parse_failure(function, body, e));
        }

        let response = Response {
            request_id: read_be32(&body[0..4]),
            return_code: read_be32(&body[4..8]),
            reason_code: read_be32(&body[8..12]),
            output,
        };
        tracing::debug!(
            function,
            request_id = response.request_id,
            return_code = response.return_code,
            reason_code = response.reason_code,
            "response decoded"
        );
        Ok(response)
    }

    /// Dumps the offending body (string-size mismatches only) and wraps
    /// the parse error.
    fn parse_failure(&self, function: &'static str, body: &[u8], e: ParseError) -> Error {
        tracing::error!(function, error = %e, "response failed to decode");
        if matches!(e, ParseError::InvalidStringSize { .. }) {
            if let Some(dir) = &self.dump_dir {
                match dump::write(dir, function, body) {
                    Ok(path) => tracing::error!(function, path = %path.display(), "raw response dumped"),
                    Err(io) => tracing::error!(function, error = %io, "dump failed"),
                }
            }
        }
        Error::Parse(e)
    }

    /// Reads one big-endian `u32` from the stream.
    fn read_u32(&mut self) -> std::result::Result<u32, crate::socket::SocketError> {
        let mut buf = [0u8; 4];
        self.socket.recv_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }
}

/// Big-endian `u32` from a 4-byte slice.
fn read_be32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}
