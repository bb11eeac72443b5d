//! Image lifecycle and query functions.

use smapi_wire::{ErrorBufMode, Field, FieldKind, UNBOUNDED};

use crate::api::{self, CallStatus};
use crate::client::Client;
use crate::config::Config;
use crate::error::Result;
use crate::socket::Socket;

/// `Image_Name_Query_DM`: header plus a name list consuming the rest of
/// the response.
static NAME_QUERY_TABLE: &[Field] = &[
    Field::new(FieldKind::StructLen, "base"),
    Field::new(FieldKind::Int4, "request_id"),
    Field::new(FieldKind::RetCode, "return_code"),
    Field::new(FieldKind::RsnCode, "reason_code"),
    Field::new(FieldKind::ArrayNullTerm, "names"),
    Field::new(FieldKind::ArrayStructCount, "name_count"),
    Field::new(FieldKind::StructLen, "name").slot(1).level(1),
    Field::new(FieldKind::End, ""),
];

/// `Image_Activate` / `Image_Deactivate`: header plus the error buffer.
static ACTIVATE_TABLE: &[Field] = &[
    Field::new(FieldKind::StructLen, "base"),
    Field::new(FieldKind::Int4, "request_id"),
    Field::new(FieldKind::RetCode, "return_code"),
    Field::new(FieldKind::RsnCode, "reason_code"),
    Field::new(FieldKind::ErrorBuf, "error_data"),
    Field::new(FieldKind::End, ""),
];

/// `Image_Active_Configuration_Query`: memory fields plus counted CPU and
/// device record arrays.
static ACTIVE_CONFIG_TABLE: &[Field] = &[
    Field::new(FieldKind::StructLen, "base"),
    Field::new(FieldKind::Int4, "request_id"),
    Field::new(FieldKind::RetCode, "return_code"),
    Field::new(FieldKind::RsnCode, "reason_code"),
    Field::new(FieldKind::Int4, "memory_size"),
    Field::new(FieldKind::String, "memory_unit").sized(0, 8),
    Field::new(FieldKind::ArrayCount, "cpus"),
    Field::new(FieldKind::ArrayStructCount, "cpu_count"),
    Field::new(FieldKind::StructLen, "cpu").slot(1).level(1).sized(0, 4),
    Field::new(FieldKind::Int4, "cpu_number").slot(1).level(1),
    Field::new(FieldKind::CStr, "cpu_id").slot(1).level(1).sized(0, UNBOUNDED),
    Field::new(FieldKind::ArrayCount, "devices"),
    Field::new(FieldKind::ArrayStructCount, "device_count"),
    Field::new(FieldKind::StructLen, "device").slot(2).level(1).sized(0, 4),
    Field::new(FieldKind::Int4, "device_type").slot(2).level(1),
    Field::new(FieldKind::CStr, "device_address").slot(2).level(1).sized(0, UNBOUNDED),
    Field::new(FieldKind::End, ""),
];

/// Output of [`Client::image_name_query_dm`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ImageNameList {
    /// Call outcome.
    pub status: CallStatus,
    /// Image names defined in the directory.
    pub names: Vec<String>,
}

/// One logical CPU of an active image.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Cpu {
    /// CPU address within the image.
    pub number: u32,
    /// CPU identifier string.
    pub id: String,
}

/// One virtual device of an active image.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Device {
    /// Device type code.
    pub device_type: u32,
    /// Virtual device address.
    pub address: String,
}

/// Output of [`Client::image_active_configuration_query`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ActiveConfiguration {
    /// Call outcome.
    pub status: CallStatus,
    /// Memory size in `memory_unit` units.
    pub memory_size: u32,
    /// Unit of `memory_size` (e.g. `"M"`, `"G"`).
    pub memory_unit: String,
    /// Logical CPUs currently defined.
    pub cpus: Vec<Cpu>,
    /// Virtual devices currently defined.
    pub devices: Vec<Device>,
}

impl<S: Socket> Client<S> {
    /// Lists the image names the directory manager knows about.
    pub fn image_name_query_dm(&mut self, config: &Config, target: &str) -> Result<ImageNameList> {
        const NAME: &str = "Image_Name_Query_DM";
        let request = api::prologue(NAME, config, target).encode();
        let resp = self.call(NAME, &request, NAME_QUERY_TABLE, ErrorBufMode::NotPossible)?;

        let names = resp.output.base().map_or_else(Vec::new, |b| {
            b.records("names")
                .map(|r| api::text_field(&r, "name"))
                .collect()
        });
        Ok(ImageNameList {
            status: CallStatus::from_response(&resp),
            names,
        })
    }

    /// Activates (logs on) the target image.
    pub fn image_activate(&mut self, config: &Config, target: &str) -> Result<CallStatus> {
        const NAME: &str = "Image_Activate";
        let request = api::prologue(NAME, config, target).encode();
        let resp = self.call(NAME, &request, ACTIVATE_TABLE, ErrorBufMode::WithLengthField)?;
        Ok(CallStatus::from_response(&resp))
    }

    /// Deactivates the target image. `force_time` is the `IMMED` /
    /// `WITHIN interval` specification the server expects.
    pub fn image_deactivate(
        &mut self,
        config: &Config,
        target: &str,
        force_time: &str,
    ) -> Result<CallStatus> {
        const NAME: &str = "Image_Deactivate";
        let request = api::prologue(NAME, config, target)
            .string(force_time)
            .encode();
        let resp = self.call(NAME, &request, ACTIVATE_TABLE, ErrorBufMode::WithLengthField)?;
        Ok(CallStatus::from_response(&resp))
    }

    /// Queries the running configuration of an active image.
    pub fn image_active_configuration_query(
        &mut self,
        config: &Config,
        target: &str,
    ) -> Result<ActiveConfiguration> {
        const NAME: &str = "Image_Active_Configuration_Query";
        let request = api::prologue(NAME, config, target).encode();
        let resp = self.call(NAME, &request, ACTIVE_CONFIG_TABLE, ErrorBufMode::NotPossible)?;

        let status = CallStatus::from_response(&resp);
        let Some(base) = resp.output.base() else {
            return Ok(ActiveConfiguration {
                status,
                memory_size: 0,
                memory_unit: String::new(),
                cpus: Vec::new(),
                devices: Vec::new(),
            });
        };

        let cpus = base
            .records("cpus")
            .map(|r| Cpu {
                number: api::u32_field(&r, "cpu_number"),
                id: api::text_field(&r, "cpu_id"),
            })
            .collect();
        let devices = base
            .records("devices")
            .map(|r| Device {
                device_type: api::u32_field(&r, "device_type"),
                address: api::text_field(&r, "device_address"),
            })
            .collect();
        Ok(ActiveConfiguration {
            status,
            memory_size: api::u32_field(&base, "memory_size"),
            memory_unit: api::text_field(&base, "memory_unit"),
            cpus,
            devices,
        })
    }
}
