//! Wire format for z/VM SMAPI requests and responses.
//!
//! SMAPI responses are self-describing binary buffers: nested, nullable,
//! variable-length structures whose layout is declared per API by a
//! [`Field`] table. Decoding runs in two passes over the same table — a
//! **scan** pass computes exact storage sizes, then a **populate** pass
//! fills the pre-sized [`OutputBuffer`] — so every allocation happens
//! exactly once and every read is bounds-checked.
//!
//! Requests are the simple mirror: [`Request`] appends big-endian,
//! length-prefixed fields in wire order.
//!
//! This crate is pure data transformation; the socket transport and retry
//! protocol live in the `smapi` crate.

mod cursor;
mod error;
mod output;
mod parser;
mod request;
mod table;

pub use cursor::Cursor;
pub use error::ParseError;
pub use output::{Cell, ListRef, OutputBuffer, Record, Sizes, SlotSize, StrRef};
pub use parser::{ErrorBufMode, populate, scan};
pub use request::Request;
pub use table::{Field, FieldKind, MAX_NEST, MAX_SLOTS, UNBOUNDED, validate};
