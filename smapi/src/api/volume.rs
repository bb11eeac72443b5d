//! `Image_Volume_Space_Query_DM` — DASD space allocated to an image.

use smapi_wire::{ErrorBufMode, Field, FieldKind, UNBOUNDED};

use crate::api::{self, CallStatus};
use crate::client::Client;
use crate::config::Config;
use crate::error::Result;
use crate::socket::Socket;

/// Response layout: header plus a length-prefixed array of volume
/// records.
static TABLE: &[Field] = &[
    Field::new(FieldKind::StructLen, "base"),
    Field::new(FieldKind::Int4, "request_id"),
    Field::new(FieldKind::RetCode, "return_code"),
    Field::new(FieldKind::RsnCode, "reason_code"),
    Field::new(FieldKind::ArrayLen, "volumes"),
    Field::new(FieldKind::ArrayStructCount, "volume_count"),
    Field::new(FieldKind::StructLen, "volume").slot(1).level(1).sized(0, 4),
    Field::new(FieldKind::CStr, "volume_id").slot(1).level(1).sized(0, UNBOUNDED),
    Field::new(FieldKind::Int4, "device_type").slot(1).level(1),
    Field::new(FieldKind::Int4, "start_cylinder").slot(1).level(1),
    Field::new(FieldKind::Int4, "size_cylinders").slot(1).level(1),
    Field::new(FieldKind::End, ""),
];

/// One volume extent allocated to the image.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct VolumeSpace {
    /// Volume serial.
    pub volume_id: String,
    /// DASD device type code.
    pub device_type: u32,
    /// First cylinder of the extent.
    pub start_cylinder: u32,
    /// Extent size in cylinders.
    pub size_cylinders: u32,
}

/// Output of [`Client::image_volume_space_query_dm`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct VolumeSpaceList {
    /// Call outcome.
    pub status: CallStatus,
    /// Extents reported for the image.
    pub volumes: Vec<VolumeSpace>,
}

impl<S: Socket> Client<S> {
    /// Queries the DASD extents the directory manager has allocated to
    /// the target image. `entry_type` selects the definition class and
    /// `subpool` names the region pool (empty = all).
    pub fn image_volume_space_query_dm(
        &mut self,
        config: &Config,
        target: &str,
        entry_type: u8,
        subpool: &str,
    ) -> Result<VolumeSpaceList> {
        const NAME: &str = "Image_Volume_Space_Query_DM";
        let request = api::prologue(NAME, config, target)
            .int1(entry_type)
            .string(subpool)
            .encode();
        let resp = self.call(NAME, &request, TABLE, ErrorBufMode::NotPossible)?;

        let volumes = resp.output.base().map_or_else(Vec::new, |b| {
            b.records("volumes")
                .map(|r| VolumeSpace {
                    volume_id: api::text_field(&r, "volume_id"),
                    device_type: api::u32_field(&r, "device_type"),
                    start_cylinder: api::u32_field(&r, "start_cylinder"),
                    size_cylinders: api::u32_field(&r, "size_cylinders"),
                })
                .collect()
        });
        Ok(VolumeSpaceList {
            status: CallStatus::from_response(&resp),
            volumes,
        })
    }
}
