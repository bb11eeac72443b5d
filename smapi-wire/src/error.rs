//! Parse errors for the table-driven response decoder.

/// Errors produced while scanning or populating a response body.
///
/// [`InvalidTable`] and [`InvalidStringSize`] indicate a field-table bug or
/// a protocol-version mismatch respectively; neither is expected in normal
/// operation and neither is retried.
///
/// [`InvalidTable`]: ParseError::InvalidTable
/// [`InvalidStringSize`]: ParseError::InvalidStringSize
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The field table is self-inconsistent (bad first row, missing
    /// sentinel, or a marker without its mandated sibling).
    #[error("invalid field table at row {index}: {reason}")]
    InvalidTable {
        /// Index of the offending table row.
        index: usize,
        /// What the row violated.
        reason: &'static str,
    },

    /// A declared string length fell outside the table's allowed range.
    #[error(
        "field `{field}`: declared length {len} outside {min}..={max} at offset {offset}"
    )]
    InvalidStringSize {
        /// Symbolic name of the offending field.
        field: &'static str,
        /// Length declared on the wire.
        len: usize,
        /// Minimum allowed payload length.
        min: u32,
        /// Maximum allowed payload length (`-1` = unbounded).
        max: i64,
        /// Byte offset into the response body where the length was read.
        offset: usize,
    },

    /// A read ran past the end of the response body or of a declared
    /// sub-region.
    #[error("truncated response: needed {needed} bytes at offset {offset}, {remaining} remain")]
    Truncated {
        /// Byte offset where the read started.
        offset: usize,
        /// Bytes the read required.
        needed: usize,
        /// Bytes actually remaining.
        remaining: usize,
    },
}
