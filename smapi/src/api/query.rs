//! `Query_API_Functional_Level` — what level of the API the server runs.

use smapi_wire::{ErrorBufMode, Field, FieldKind, UNBOUNDED};

use crate::api::{self, CallStatus};
use crate::client::Client;
use crate::config::Config;
use crate::error::Result;
use crate::socket::Socket;

/// Response layout: common header plus the level string.
static TABLE: &[Field] = &[
    Field::new(FieldKind::StructLen, "base"),
    Field::new(FieldKind::Int4, "request_id"),
    Field::new(FieldKind::RetCode, "return_code"),
    Field::new(FieldKind::RsnCode, "reason_code"),
    Field::new(FieldKind::String, "version_info").sized(0, UNBOUNDED),
    Field::new(FieldKind::End, ""),
];

/// Output of [`Client::query_api_functional_level`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct FunctionalLevel {
    /// Call outcome.
    pub status: CallStatus,
    /// Server-reported level, e.g. `"V7.3"`. Empty when the call failed.
    pub level: String,
}

impl<S: Socket> Client<S> {
    /// Queries the functional level of the SMAPI server managing `target`.
    pub fn query_api_functional_level(
        &mut self,
        config: &Config,
        target: &str,
    ) -> Result<FunctionalLevel> {
        const NAME: &str = "Query_API_Functional_Level";
        let request = api::prologue(NAME, config, target).encode();
        let resp = self.call(NAME, &request, TABLE, ErrorBufMode::NotPossible)?;

        let level = resp
            .output
            .base()
            .map(|b| api::text_field(&b, "version_info"))
            .unwrap_or_default();
        Ok(FunctionalLevel {
            status: CallStatus::from_response(&resp),
            level,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::api::testutil::{client_returning, config, header};

    #[test]
    fn decodes_the_level_string() {
        let mut body = header(1, 0, 0);
        body.extend_from_slice(&4u32.to_be_bytes());
        body.extend_from_slice(b"V7.3");

        let mut c = client_returning(body);
        let out = c.query_api_functional_level(&config(), "LINUX01").unwrap();

        assert!(out.status.is_success());
        assert_eq!(out.level, "V7.3");
    }

    #[test]
    fn missing_level_field_decodes_empty() {
        let mut c = client_returning(header(1, 0, 0));
        let out = c.query_api_functional_level(&config(), "LINUX01").unwrap();
        assert_eq!(out.level, "");
    }
}
