//! Decoded output storage: per-slot record arenas plus one shared string
//! arena.
//!
//! The scan pass produces a [`Sizes`] summary; [`OutputBuffer::allocate`]
//! reserves exactly that much storage; the populate pass then fills it.
//! Cross-references between structure levels are typed handles ([`StrRef`],
//! [`ListRef`]) instead of raw addresses, and nothing is mutated after
//! populate completes.

use std::borrow::Cow;

use crate::table::MAX_SLOTS;

/// Storage requirements computed by the scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Sizes {
    /// Per-slot record counts and fixed record widths (in cells).
    pub slots: [SlotSize; MAX_SLOTS],
    /// Total bytes of variable-length string/byte content, terminators
    /// included for NUL-terminated payloads.
    pub string_bytes: usize,
}

/// Scan result for one structure slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct SlotSize {
    /// Number of record instances seen.
    pub records: usize,
    /// Cells per record, captured from the first completed instance.
    pub width: usize,
}

/// Handle to a byte run inside the string arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrRef {
    /// Byte offset into the arena.
    offset: u32,
    /// Payload length (excludes any stored terminator).
    len: u32,
}

/// Handle to a run of child records inside another slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct ListRef {
    /// Child slot index.
    pub slot: usize,
    /// Index of the first child record.
    pub start: usize,
    /// Number of child records.
    pub count: usize,
}

/// One decoded field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Cell {
    /// 1-byte integer.
    Int1(u8),
    /// 4-byte integer (also return/reason codes).
    Int4(u32),
    /// 8-byte integer.
    Int8(u64),
    /// Non-empty string/byte payload.
    Str(StrRef),
    /// Head of a non-empty child array.
    List(ListRef),
    /// Back-filled count (char-buffer length or array element count).
    Count(u32),
    /// Absent or zero-length value — the typed analog of a null pointer.
    Null,
}

/// One slot's arena: a flat cell store holding `records × width` cells,
/// plus the symbolic field names of one record (captured while the first
/// instance was filled).
#[derive(Debug, Default)]
struct SlotArena {
    /// Field names of one record, in cell order.
    names: Vec<&'static str>,
    /// All cells, record-major.
    cells: Vec<Cell>,
    /// Cells per record; 0 until the first record completes.
    width: usize,
    /// Completed record count.
    complete: usize,
}

/// Decoded output of one call: slot arenas plus the shared string arena.
#[derive(Debug)]
pub struct OutputBuffer {
    /// One arena per structure slot.
    slots: Vec<SlotArena>,
    /// All variable-length content, packed in populate order.
    strings: Vec<u8>,
}

impl OutputBuffer {
    /// Reserves storage for exactly the sizes the scan pass computed.
    pub fn allocate(sizes: &Sizes) -> Self {
        let slots = sizes
            .slots
            .iter()
            .map(|s| SlotArena {
                names: Vec::with_capacity(s.width),
                cells: Vec::with_capacity(s.records * s.width),
                width: 0,
                complete: 0,
            })
            .collect();
        Self {
            slots,
            strings: Vec::with_capacity(sizes.string_bytes),
        }
    }

    /// Number of completed records in a slot.
    pub fn record_count(&self, slot: usize) -> usize {
        self.slots.get(slot).map_or(0, |s| s.complete)
    }

    /// Bytes currently held by the string arena.
    pub fn string_len(&self) -> usize {
        self.strings.len()
    }

    /// The base record (slot of the table's first row, record 0).
    pub fn base(&self) -> Option<Record<'_>> {
        self.record(0, 0)
    }

    /// A record by slot and index.
    pub fn record(&self, slot: usize, index: usize) -> Option<Record<'_>> {
        let arena = self.slots.get(slot)?;
        if index >= arena.complete || arena.width == 0 {
            return None;
        }
        let at = index * arena.width;
        Some(Record {
            out: self,
            names: &arena.names,
            cells: &arena.cells[at..at + arena.width],
        })
    }

    /// Iterates the child records a [`ListRef`] points at.
    pub fn list(&self, list: ListRef) -> impl Iterator<Item = Record<'_>> {
        (list.start..list.start + list.count).filter_map(move |i| self.record(list.slot, i))
    }

    /// Raw bytes of a string handle.
    pub fn str_bytes(&self, s: StrRef) -> &[u8] {
        &self.strings[s.offset as usize..s.offset as usize + s.len as usize]
    }

    /// Text of a string handle (lossy outside ASCII).
    pub fn text(&self, s: StrRef) -> Cow<'_, str> {
        String::from_utf8_lossy(self.str_bytes(s))
    }

    /// Opens a new record in `slot`. Populate-internal.
    pub(crate) fn begin_record(&mut self, slot: usize) {
        debug_assert!(slot < self.slots.len());
        let _ = slot;
    }

    /// Appends a cell to the open record in `slot`. Populate-internal.
    pub(crate) fn push_cell(&mut self, slot: usize, name: &'static str, cell: Cell) {
        let arena = &mut self.slots[slot];
        if arena.complete == 0 {
            arena.names.push(name);
        }
        arena.cells.push(cell);
    }

    /// Copies `bytes` into the string arena, returning its handle.
    /// `terminated` appends a NUL after the payload (C-string heritage).
    pub(crate) fn push_str(&mut self, bytes: &[u8], terminated: bool) -> StrRef {
        #[allow(clippy::cast_possible_truncation)]
        let r = StrRef {
            offset: self.strings.len() as u32,
            len: bytes.len() as u32,
        };
        self.strings.extend_from_slice(bytes);
        if terminated {
            self.strings.push(0);
        }
        r
    }

    /// Closes the open record in `slot`. Populate-internal.
    pub(crate) fn end_record(&mut self, slot: usize) {
        let arena = &mut self.slots[slot];
        if arena.complete == 0 {
            arena.width = arena.cells.len();
        }
        arena.complete += 1;
        debug_assert_eq!(arena.cells.len(), arena.complete * arena.width);
    }

    /// Index the next record in `slot` will get. Populate-internal.
    pub(crate) fn next_record(&self, slot: usize) -> usize {
        self.slots[slot].complete
    }
}

/// Read-only view of one decoded record.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    /// Owning output buffer (for string and child-record resolution).
    out: &'a OutputBuffer,
    /// Field names, in cell order.
    names: &'a [&'static str],
    /// The record's cells.
    cells: &'a [Cell],
}

impl<'a> Record<'a> {
    /// The cell stored under `name`, if the field decoded.
    pub fn cell(&self, name: &str) -> Option<&'a Cell> {
        let at = self.names.iter().position(|n| *n == name)?;
        self.cells.get(at)
    }

    /// An integer field of any width, widened to `u64`.
    pub fn int(&self, name: &str) -> Option<u64> {
        match self.cell(name)? {
            Cell::Int1(v) => Some(u64::from(*v)),
            Cell::Int4(v) => Some(u64::from(*v)),
            Cell::Int8(v) => Some(*v),
            Cell::Count(v) => Some(u64::from(*v)),
            _ => None,
        }
    }

    /// A back-filled count field.
    pub fn count(&self, name: &str) -> Option<u32> {
        match self.cell(name)? {
            Cell::Count(v) => Some(*v),
            _ => None,
        }
    }

    /// Raw bytes of a string field; `None` when absent or null.
    pub fn bytes(&self, name: &str) -> Option<&'a [u8]> {
        match self.cell(name)? {
            Cell::Str(s) => Some(self.out.str_bytes(*s)),
            _ => None,
        }
    }

    /// Text of a string field (lossy outside ASCII).
    pub fn text(&self, name: &str) -> Option<Cow<'a, str>> {
        match self.cell(name)? {
            Cell::Str(s) => Some(self.out.text(*s)),
            _ => None,
        }
    }

    /// Child records of an array field. Empty for `Null` heads.
    pub fn records(&self, name: &str) -> Box<dyn Iterator<Item = Record<'a>> + 'a> {
        match self.cell(name) {
            Some(Cell::List(l)) => Box::new(self.out.list(*l)),
            _ => Box::new(std::iter::empty()),
        }
    }

    /// `true` when the field is present and non-null.
    pub fn is_set(&self, name: &str) -> bool {
        !matches!(self.cell(name), None | Some(Cell::Null))
    }
}
