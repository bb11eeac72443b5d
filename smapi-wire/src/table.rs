//! Declarative field tables describing one API's response layout.
//!
//! A table is an ordered slice of [`Field`] rows interpreted by the parser
//! in two passes (scan, then populate). Tables are plain `'static` data and
//! are safely shared between calls and threads.

use crate::error::ParseError;

/// Maximum number of output structure slots a table may address.
pub const MAX_SLOTS: usize = 10;

/// Maximum nesting depth of repeated structures.
pub const MAX_NEST: usize = 10;

/// `max` value meaning "no upper bound" for a variable-length payload.
pub const UNBOUNDED: i64 = -1;

/// Wire interpretation of one table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FieldKind {
    /// Structure-length marker. The first row of every table carries one
    /// for the base structure; inside an array block it describes one
    /// element, where `max == 0` means the element length is not on the
    /// wire (the implied-structure convention).
    StructLen,
    /// Fixed 1-byte integer.
    Int1,
    /// Fixed 4-byte big-endian integer.
    Int4,
    /// Fixed 8-byte big-endian integer.
    Int8,
    /// 4-byte integer holding the call's return code.
    RetCode,
    /// 4-byte integer holding the call's reason code. Parsing this row
    /// triggers the error-buffer side channel when the return code is
    /// non-zero.
    RsnCode,
    /// Variable-length string with a 4-byte length prefix.
    String,
    /// NUL-terminated string.
    CStr,
    /// Length-prefixed byte buffer whose length is also surfaced through
    /// the mandatory [`CharBufCount`] sibling row.
    ///
    /// [`CharBufCount`]: FieldKind::CharBufCount
    CharBuf,
    /// Back-filled count sibling of a [`CharBuf`]; consumes no wire bytes.
    ///
    /// [`CharBuf`]: FieldKind::CharBuf
    CharBufCount,
    /// Array with a 4-byte total byte budget on the wire.
    ArrayLen,
    /// Array whose byte budget is a NUL-terminated decimal string.
    ArrayLenCStr,
    /// Array consuming the remainder of the enclosing region.
    ArrayNoLen,
    /// Array with a 4-byte element count on the wire.
    ArrayCount,
    /// Array of NUL-terminated strings consuming the rest of the response.
    /// Must be the last wire-consuming block in the table.
    ArrayNullTerm,
    /// Count sink receiving an array's final element count; consumes no
    /// wire bytes.
    ArrayStructCount,
    /// Target of the error-description blob captured by the [`RsnCode`]
    /// side channel; consumes no wire bytes itself.
    ///
    /// [`RsnCode`]: FieldKind::RsnCode
    ErrorBuf,
    /// End-of-table sentinel.
    End,
}

impl FieldKind {
    /// `true` for the three array-marker families plus the string-array
    /// marker.
    pub(crate) const fn is_array(self) -> bool {
        matches!(
            self,
            Self::ArrayLen
                | Self::ArrayLenCStr
                | Self::ArrayNoLen
                | Self::ArrayCount
                | Self::ArrayNullTerm
        )
    }
}

/// One row of a field table.
///
/// `min`/`max` bound variable-length payloads (`max == -1` = unbounded,
/// see [`UNBOUNDED`]); `slot` selects the destination structure arena;
/// `level` is the nesting depth; `name` is the symbolic destination field
/// used for typed access and diagnostics.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct Field {
    /// Wire interpretation of this row.
    pub kind: FieldKind,
    /// Minimum allowed payload length.
    pub min: u32,
    /// Maximum allowed payload length, or [`UNBOUNDED`].
    pub max: i64,
    /// Destination structure slot (`0..MAX_SLOTS`).
    pub slot: usize,
    /// Nesting level (`0..MAX_NEST`).
    pub level: u8,
    /// Symbolic field name.
    pub name: &'static str,
}

impl Field {
    /// A row with no size bounds at slot 0, level 0.
    pub const fn new(kind: FieldKind, name: &'static str) -> Self {
        Self {
            kind,
            min: 0,
            max: UNBOUNDED,
            slot: 0,
            level: 0,
            name,
        }
    }

    /// Sets the allowed payload length range.
    pub const fn sized(mut self, min: u32, max: i64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Sets the destination slot.
    pub const fn slot(mut self, slot: usize) -> Self {
        self.slot = slot;
        self
    }

    /// Sets the nesting level.
    pub const fn level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }
}

/// Resolved layout of one array block within a table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ArrayShape {
    /// Index of the count-sink row, if declared.
    pub count_row: Option<usize>,
    /// Index of the element structure-length row.
    pub len_row: usize,
    /// First element-field row.
    pub body: usize,
    /// First row past the block (the handler's return index).
    pub end: usize,
    /// `true` when each element carries a 4-byte length on the wire.
    pub wire_elem_len: bool,
}

/// Resolves the mandatory sibling rows of the array marker at `index`.
pub(crate) fn array_shape(rows: &[Field], index: usize) -> Result<ArrayShape, ParseError> {
    let marker = &rows[index];
    let mut i = index + 1;

    let count_row = if i < rows.len() && rows[i].kind == FieldKind::ArrayStructCount {
        i += 1;
        Some(i - 1)
    } else {
        None
    };
    if marker.kind == FieldKind::ArrayNullTerm && count_row.is_none() {
        return Err(ParseError::InvalidTable {
            index,
            reason: "null-terminated array requires a count sink row",
        });
    }

    if i >= rows.len() || rows[i].kind != FieldKind::StructLen {
        return Err(ParseError::InvalidTable {
            index,
            reason: "array marker not followed by a structure-length row",
        });
    }
    let len_row = i;

    if marker.kind == FieldKind::ArrayNullTerm {
        // String arrays have no element-field rows and must close the table.
        let end = len_row + 1;
        if rows.get(end).map(|r| r.kind) != Some(FieldKind::End) {
            return Err(ParseError::InvalidTable {
                index,
                reason: "null-terminated array must be the last block in the table",
            });
        }
        return Ok(ArrayShape {
            count_row,
            len_row,
            body: end,
            end,
            wire_elem_len: false,
        });
    }

    let body = len_row + 1;
    let mut end = body;
    while end < rows.len()
        && rows[end].kind != FieldKind::End
        && rows[end].level > marker.level
    {
        end += 1;
    }
    if body == end {
        return Err(ParseError::InvalidTable {
            index,
            reason: "array element has no field rows",
        });
    }

    Ok(ArrayShape {
        count_row,
        len_row,
        body,
        end,
        wire_elem_len: rows[len_row].max != 0,
    })
}

/// Checks the structural invariants of a field table.
///
/// Violations are programming errors in the table, never wire conditions;
/// the parser refuses to run over an invalid table.
pub fn validate(rows: &[Field]) -> Result<(), ParseError> {
    if rows.len() < 2 {
        return Err(ParseError::InvalidTable {
            index: 0,
            reason: "table must hold at least a base marker and the end sentinel",
        });
    }
    if rows[0].kind != FieldKind::StructLen {
        return Err(ParseError::InvalidTable {
            index: 0,
            reason: "first row must be the base structure-length marker",
        });
    }
    if rows[rows.len() - 1].kind != FieldKind::End {
        return Err(ParseError::InvalidTable {
            index: rows.len() - 1,
            reason: "table must terminate with the end sentinel",
        });
    }

    for (index, row) in rows.iter().enumerate() {
        if row.slot >= MAX_SLOTS {
            return Err(ParseError::InvalidTable {
                index,
                reason: "slot index out of range",
            });
        }
        if usize::from(row.level) >= MAX_NEST {
            return Err(ParseError::InvalidTable {
                index,
                reason: "nesting level out of range",
            });
        }
        if row.kind == FieldKind::End && index != rows.len() - 1 {
            return Err(ParseError::InvalidTable {
                index,
                reason: "end sentinel before the last row",
            });
        }
    }

    // Sibling-position rules: bound rows may only appear where their owner
    // puts them.
    let mut claimed = vec![false; rows.len()];
    claimed[0] = true;
    for index in 0..rows.len() {
        let kind = rows[index].kind;
        if kind.is_array() {
            let shape = array_shape(rows, index)?;
            if let Some(c) = shape.count_row {
                claimed[c] = true;
            }
            claimed[shape.len_row] = true;
        } else if kind == FieldKind::CharBuf {
            match rows.get(index + 1) {
                Some(next) if next.kind == FieldKind::CharBufCount => {
                    claimed[index + 1] = true;
                }
                _ => {
                    return Err(ParseError::InvalidTable {
                        index,
                        reason: "char buffer not followed by its count sibling",
                    });
                }
            }
        }
    }
    for (index, row) in rows.iter().enumerate() {
        let bound = matches!(
            row.kind,
            FieldKind::StructLen | FieldKind::CharBufCount | FieldKind::ArrayStructCount
        );
        if bound && !claimed[index] {
            return Err(ParseError::InvalidTable {
                index,
                reason: "marker row outside its mandated position",
            });
        }
    }

    Ok(())
}

/// `true` when the table declares an error-buffer target row.
pub(crate) fn has_error_row(rows: &[Field]) -> bool {
    rows.iter().any(|r| r.kind == FieldKind::ErrorBuf)
}
