//! Client for the z/VM Systems Management API (SMAPI).
//!
//! `smapi` marshals typed function calls into SMAPI's self-describing
//! binary wire format, drives the socket transport with its bounded-retry
//! and response-recovery protocol, and unmarshals the variable-length,
//! nested-structure responses back into typed Rust values. The wire format
//! itself lives in the [`smapi_wire`] crate.
//!
//! # Quick start
//!
//! ```no_run
//! use smapi::{Client, Config};
//!
//! let config = Config::new("zvm.example.com", "MAINT", "secret");
//! let mut client = Client::from_config(&config);
//!
//! let images = client
//!     .image_name_query_dm(&config, "MAINT")
//!     .expect("SMAPI call failed");
//! for name in images.names {
//!     println!("{name}");
//! }
//! ```
//!
//! Calls run synchronously end to end; retries are plain sleeps on the
//! documented back-off schedule. Field tables are immutable `'static`
//! data, so independent clients on independent threads are safe — a
//! single [`Client`] must not be shared mid-call.

mod api;
mod client;
mod config;
mod dump;
mod error;
mod rcmsg;
mod socket;

pub use api::{
    ActiveConfiguration, CallStatus, Cpu, Device, FunctionalLevel, ImageNameList, VolumeSpace,
    VolumeSpaceList,
};
pub use client::{Client, Response, SEND_RETRY_SLEEP_SECS};
pub use config::{Config, DEFAULT_PORT};
pub use dump::DUMP_LIMIT;
pub use error::{Error, Result};
pub use rcmsg::describe;
pub use smapi_wire::{ErrorBufMode, Field, FieldKind, OutputBuffer, Request};
pub use socket::{Socket, SocketError, TcpSocket};
