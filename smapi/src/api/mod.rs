//! Per-API marshalling functions.
//!
//! Every function follows one template: append its parameters to the
//! standard request prologue (function name, userid, password, target),
//! drive the transport, then project a typed output from the decoded cell
//! arenas. Only a representative set is implemented; the full catalog is
//! hundreds of functions shaped exactly like these.

mod image;
mod query;
mod volume;

pub use image::{ActiveConfiguration, Cpu, Device, ImageNameList};
pub use query::FunctionalLevel;
pub use volume::{VolumeSpace, VolumeSpaceList};

use std::borrow::Cow;

use smapi_wire::{Record, Request};

use crate::client::Response;
use crate::config::Config;
use crate::rcmsg;

/// Outcome every call carries: the return/reason pair plus the error
/// description the server attached, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct CallStatus {
    /// Call return code.
    pub return_code: u32,
    /// Call reason code.
    pub reason_code: u32,
    /// Error-description text captured from the error buffer.
    pub error_text: Option<String>,
}

impl CallStatus {
    /// Projects the status out of a decoded response.
    pub(crate) fn from_response(resp: &Response) -> Self {
        let error_text = resp
            .output
            .base()
            .and_then(|b| b.text("error_data").map(Cow::into_owned));
        Self {
            return_code: resp.return_code,
            reason_code: resp.reason_code,
            error_text,
        }
    }

    /// `true` when the server reported success.
    pub const fn is_success(&self) -> bool {
        self.return_code == 0
    }

    /// Well-known description of the return/reason pair, if one exists.
    pub const fn describe(&self) -> Option<&'static str> {
        rcmsg::describe(self.return_code, self.reason_code)
    }
}

/// Standard request prologue: function name, userid, password, target.
pub(crate) fn prologue(function: &str, config: &Config, target: &str) -> Request {
    Request::new(function)
        .string(&config.userid)
        .string(&config.password)
        .string(target)
}

/// Integer field narrowed to `u32`, zero when absent.
pub(crate) fn u32_field(record: &Record<'_>, name: &str) -> u32 {
    record
        .int(name)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

/// Text field as an owned string, empty when absent.
pub(crate) fn text_field(record: &Record<'_>, name: &str) -> String {
    record.text(name).map(Cow::into_owned).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testutil {
    //! Shared scaffolding for API-wrapper tests.

    use std::time::Duration;

    use crate::client::{Client, SEND_RETRY_SLEEP_SECS};
    use crate::config::Config;
    use crate::socket::script::{Script, Step};

    /// A client whose socket will deliver `body` as the whole response.
    pub(crate) fn client_returning(body: Vec<u8>) -> Client<Script> {
        let steps = vec![
            Step::SendOk,
            Step::Read(1u32.to_be_bytes().to_vec()),
            Step::Read(u32::try_from(body.len()).unwrap().to_be_bytes().to_vec()),
            Step::Read(body),
        ];
        Client::with_socket(Script::new(steps))
            .retry_schedule(&[Duration::ZERO; SEND_RETRY_SLEEP_SECS.len()])
            .recovery_delay(Duration::ZERO)
            .dump_dir(None)
    }

    /// Credentials used by every wrapper test.
    pub(crate) fn config() -> Config {
        Config::new("zvm.test", "MAINT", "pw")
    }

    /// 12-byte response header.
    pub(crate) fn header(id: u32, rc: u32, rs: u32) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&id.to_be_bytes());
        b.extend_from_slice(&rc.to_be_bytes());
        b.extend_from_slice(&rs.to_be_bytes());
        b
    }
}
