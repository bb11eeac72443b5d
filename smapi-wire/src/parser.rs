//! Two-pass table-driven response parser.
//!
//! The same table walk runs twice over one response body: the **scan**
//! pass computes exact storage requirements ([`Sizes`]) without writing
//! any output; the caller then allocates an [`OutputBuffer`]; the
//! **populate** pass fills it. Both passes share one walking core
//! parameterized by a sink, so they cannot disagree about layout.
//!
//! A response body may legitimately end before the table does — down-level
//! servers omit trailing output fields. Remaining wire-consuming rows emit
//! [`Cell::Null`] so record shapes stay fixed, the analog of the original
//! protocol's zeroed allocations.

use crate::cursor::Cursor;
use crate::error::ParseError;
use crate::output::{Cell, ListRef, OutputBuffer, Sizes, StrRef};
use crate::table::{self, ArrayShape, Field, FieldKind, MAX_SLOTS};

/// Per-call flag describing whether (and how) a non-zero return code may
/// be followed by an error-description blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ErrorBufMode {
    /// The API never returns an error buffer.
    #[default]
    NotPossible,
    /// The blob is prefixed with a 4-byte length.
    WithLengthField,
    /// The blob is the remaining undecoded bytes of the response.
    NoLengthField,
}

/// Scans `body` against `rows`, computing the storage the populate pass
/// will need.
pub fn scan(rows: &[Field], body: &[u8], mode: ErrorBufMode) -> Result<Sizes, ParseError> {
    let mut sink = Scanner::default();
    run(&mut sink, rows, body, mode)?;
    Ok(sink.finish())
}

/// Fills `out` from `body`. `out` must have been allocated from the
/// [`Sizes`] a prior [`scan`] of the same body computed.
pub fn populate(
    rows: &[Field],
    body: &[u8],
    mode: ErrorBufMode,
    out: &mut OutputBuffer,
) -> Result<(), ParseError> {
    let mut sink = Filler { out };
    run(&mut sink, rows, body, mode)
}

/// Where decoded values go. [`Scanner`] only accumulates sizes;
/// [`Filler`] writes cells and copies string bytes.
trait Sink {
    /// Opens a record in `slot`.
    fn begin_record(&mut self, slot: usize);
    /// Closes the open record in `slot`.
    fn end_record(&mut self, slot: usize);
    /// Index the next record in `slot` will receive.
    fn next_record(&self, slot: usize) -> usize;
    /// Emits a fixed-size cell into the open record of `slot`.
    fn put(&mut self, slot: usize, name: &'static str, cell: Cell);
    /// Emits a string cell, copying `bytes` into the string arena.
    /// `terminated` reserves/stores one extra NUL byte after the payload.
    fn put_bytes(&mut self, slot: usize, name: &'static str, bytes: &[u8], terminated: bool);
}

/// Scan-pass bookkeeping for one slot.
#[derive(Debug, Clone, Copy, Default)]
struct ScanSlot {
    /// Completed record instances.
    records: usize,
    /// Cells per record, captured from the first completed instance.
    width: usize,
    /// Cells emitted into the currently open record.
    open: usize,
}

/// Size-accumulating sink for the scan pass.
#[derive(Debug, Default)]
struct Scanner {
    /// Per-slot instance/width accounting.
    slots: [ScanSlot; MAX_SLOTS],
    /// Running byte total for all variable-length content.
    string_bytes: usize,
}

impl Scanner {
    /// Converts the accumulated counts into a [`Sizes`] summary.
    fn finish(self) -> Sizes {
        let mut sizes = Sizes::default();
        for (i, s) in self.slots.iter().enumerate() {
            sizes.slots[i].records = s.records;
            sizes.slots[i].width = s.width;
        }
        sizes.string_bytes = self.string_bytes;
        sizes
    }
}

impl Sink for Scanner {
    fn begin_record(&mut self, slot: usize) {
        self.slots[slot].open = 0;
    }

    fn end_record(&mut self, slot: usize) {
        let s = &mut self.slots[slot];
        if s.records == 0 {
            s.width = s.open;
        }
        debug_assert_eq!(s.open, s.width);
        s.records += 1;
    }

    fn next_record(&self, slot: usize) -> usize {
        self.slots[slot].records
    }

    fn put(&mut self, slot: usize, _name: &'static str, _cell: Cell) {
        self.slots[slot].open += 1;
    }

    fn put_bytes(&mut self, slot: usize, _name: &'static str, bytes: &[u8], terminated: bool) {
        self.string_bytes += bytes.len() + usize::from(terminated);
        self.slots[slot].open += 1;
    }
}

/// Storage-writing sink for the populate pass.
#[derive(Debug)]
struct Filler<'o> {
    /// Pre-sized destination.
    out: &'o mut OutputBuffer,
}

impl Sink for Filler<'_> {
    fn begin_record(&mut self, slot: usize) {
        self.out.begin_record(slot);
    }

    fn end_record(&mut self, slot: usize) {
        self.out.end_record(slot);
    }

    fn next_record(&self, slot: usize) -> usize {
        self.out.next_record(slot)
    }

    fn put(&mut self, slot: usize, name: &'static str, cell: Cell) {
        self.out.push_cell(slot, name, cell);
    }

    fn put_bytes(&mut self, slot: usize, name: &'static str, bytes: &[u8], terminated: bool) {
        let r: StrRef = self.out.push_str(bytes, terminated);
        self.out.push_cell(slot, name, Cell::Str(r));
    }
}

/// Walk state shared by both passes.
#[derive(Debug)]
struct Ctx<'a> {
    /// Latest value decoded from a `RetCode` row.
    rc: u32,
    /// Error blob captured by the `RsnCode` side channel, pending its
    /// `ErrorBuf` row.
    blob: Option<&'a [u8]>,
    /// Per-call error-buffer mode.
    mode: ErrorBufMode,
    /// Whether the table declares an `ErrorBuf` target at all.
    has_error_row: bool,
}

/// Validates the table, then walks it once against `body`.
fn run<'a, S: Sink>(
    sink: &mut S,
    rows: &[Field],
    body: &'a [u8],
    mode: ErrorBufMode,
) -> Result<(), ParseError> {
    table::validate(rows)?;
    let mut cur = Cursor::new(body);
    let mut ctx = Ctx {
        rc: 0,
        blob: None,
        mode,
        has_error_row: table::has_error_row(rows),
    };
    let base = rows[0].slot;
    sink.begin_record(base);
    walk_block(sink, rows, 1, rows.len() - 1, &mut cur, &mut ctx)?;
    sink.end_record(base);
    Ok(())
}

/// Processes rows `[start, stop)` against one wire region.
fn walk_block<'a, S: Sink>(
    sink: &mut S,
    rows: &[Field],
    start: usize,
    stop: usize,
    cur: &mut Cursor<'a>,
    ctx: &mut Ctx<'a>,
) -> Result<(), ParseError> {
    let mut i = start;
    while i < stop {
        let f = &rows[i];
        i = match f.kind {
            FieldKind::ArrayLen | FieldKind::ArrayLenCStr | FieldKind::ArrayNoLen => {
                array_by_length(sink, rows, i, cur, ctx)?
            }
            FieldKind::ArrayCount => array_by_count(sink, rows, i, cur, ctx)?,
            FieldKind::ArrayNullTerm => array_null_terminated(sink, rows, i, cur)?,
            FieldKind::StructLen
            | FieldKind::CharBufCount
            | FieldKind::ArrayStructCount
            | FieldKind::End => {
                return Err(ParseError::InvalidTable {
                    index: i,
                    reason: "marker row outside its mandated position",
                });
            }
            _ => i + scalar(sink, rows, i, cur, ctx)?,
        };
    }
    Ok(())
}

/// Decodes one scalar row (or a char-buffer pair); returns rows consumed.
fn scalar<'a, S: Sink>(
    sink: &mut S,
    rows: &[Field],
    index: usize,
    cur: &mut Cursor<'a>,
    ctx: &mut Ctx<'a>,
) -> Result<usize, ParseError> {
    let f = &rows[index];
    match f.kind {
        FieldKind::Int1 => {
            let cell = if cur.is_empty() {
                Cell::Null
            } else {
                Cell::Int1(cur.read_u8()?)
            };
            sink.put(f.slot, f.name, cell);
            Ok(1)
        }
        FieldKind::Int4 => {
            let cell = if cur.is_empty() {
                Cell::Null
            } else {
                Cell::Int4(cur.read_u32()?)
            };
            sink.put(f.slot, f.name, cell);
            Ok(1)
        }
        FieldKind::Int8 => {
            let cell = if cur.is_empty() {
                Cell::Null
            } else {
                Cell::Int8(cur.read_u64()?)
            };
            sink.put(f.slot, f.name, cell);
            Ok(1)
        }
        FieldKind::RetCode => {
            let cell = if cur.is_empty() {
                Cell::Null
            } else {
                let v = cur.read_u32()?;
                ctx.rc = v;
                Cell::Int4(v)
            };
            sink.put(f.slot, f.name, cell);
            Ok(1)
        }
        FieldKind::RsnCode => {
            let cell = if cur.is_empty() {
                Cell::Null
            } else {
                Cell::Int4(cur.read_u32()?)
            };
            sink.put(f.slot, f.name, cell);
            capture_error(cur, ctx)?;
            Ok(1)
        }
        FieldKind::String => {
            if cur.is_empty() {
                sink.put(f.slot, f.name, Cell::Null);
                return Ok(1);
            }
            let at = cur.offset();
            let len = cur.read_u32()? as usize;
            check_len(f, len, at)?;
            if len == 0 {
                sink.put(f.slot, f.name, Cell::Null);
            } else {
                let b = cur.take(len)?;
                sink.put_bytes(f.slot, f.name, b, false);
            }
            Ok(1)
        }
        FieldKind::CStr => {
            if cur.is_empty() {
                sink.put(f.slot, f.name, Cell::Null);
                return Ok(1);
            }
            let at = cur.offset();
            let b = cur.read_cstr()?;
            check_len(f, b.len(), at)?;
            if b.is_empty() {
                sink.put(f.slot, f.name, Cell::Null);
            } else {
                sink.put_bytes(f.slot, f.name, b, true);
            }
            Ok(1)
        }
        FieldKind::CharBuf => {
            // validate() guarantees the count sibling at index + 1.
            let count_field = &rows[index + 1];
            if cur.is_empty() {
                sink.put(f.slot, f.name, Cell::Null);
                sink.put(count_field.slot, count_field.name, Cell::Count(0));
                return Ok(2);
            }
            let at = cur.offset();
            let len = cur.read_u32()? as usize;
            check_len(f, len, at)?;
            if len == 0 {
                sink.put(f.slot, f.name, Cell::Null);
                sink.put(count_field.slot, count_field.name, Cell::Count(0));
            } else {
                let b = cur.take(len)?;
                sink.put_bytes(f.slot, f.name, b, false);
                #[allow(clippy::cast_possible_truncation)]
                sink.put(count_field.slot, count_field.name, Cell::Count(len as u32));
            }
            Ok(2)
        }
        FieldKind::ErrorBuf => {
            match ctx.blob.take() {
                Some(b) if !b.is_empty() => sink.put_bytes(f.slot, f.name, b, false),
                _ => sink.put(f.slot, f.name, Cell::Null),
            }
            Ok(1)
        }
        _ => Err(ParseError::InvalidTable {
            index,
            reason: "marker row outside its mandated position",
        }),
    }
}

/// The documented `RsnCode` side channel: with a non-zero return code and
/// an error-capable call, the declared-length subset (or the remaining
/// undecoded bytes) becomes the error-description blob, captured once out
/// of normal table order.
fn capture_error<'a>(cur: &mut Cursor<'a>, ctx: &mut Ctx<'a>) -> Result<(), ParseError> {
    if ctx.rc == 0 || !ctx.has_error_row || cur.is_empty() {
        return Ok(());
    }
    match ctx.mode {
        ErrorBufMode::NotPossible => Ok(()),
        ErrorBufMode::WithLengthField => {
            let n = cur.read_u32()? as usize;
            ctx.blob = Some(cur.take(n)?);
            Ok(())
        }
        ErrorBufMode::NoLengthField => {
            ctx.blob = Some(cur.take(cur.remaining())?);
            Ok(())
        }
    }
}

/// Enforces a field's declared payload-length range.
#[allow(clippy::cast_sign_loss, clippy::cast_lossless)]
fn check_len(f: &Field, len: usize, offset: usize) -> Result<(), ParseError> {
    let below = (len as u64) < u64::from(f.min);
    let above = f.max >= 0 && len as u64 > f.max as u64;
    if below || above {
        return Err(ParseError::InvalidStringSize {
            field: f.name,
            len,
            min: f.min,
            max: f.max,
            offset,
        });
    }
    Ok(())
}

/// Emits the parent-side cells of a finished array: the head handle (or
/// `Null` when no instance was produced) and the optional count sink.
fn finish_array<S: Sink>(
    sink: &mut S,
    marker: &Field,
    shape: &ArrayShape,
    rows: &[Field],
    child: usize,
    start: usize,
    count: usize,
) {
    let head = if count == 0 {
        Cell::Null
    } else {
        Cell::List(ListRef {
            slot: child,
            start,
            count,
        })
    };
    sink.put(marker.slot, marker.name, head);
    if let Some(c) = shape.count_row {
        let cf = &rows[c];
        #[allow(clippy::cast_possible_truncation)]
        sink.put(cf.slot, cf.name, Cell::Count(count as u32));
    }
}

/// Length-prefixed array family: the total byte budget comes from a
/// 4-byte integer, a NUL-terminated decimal, or the rest of the region.
/// Elements repeat until the budget is exhausted.
fn array_by_length<'a, S: Sink>(
    sink: &mut S,
    rows: &[Field],
    index: usize,
    cur: &mut Cursor<'a>,
    ctx: &mut Ctx<'a>,
) -> Result<usize, ParseError> {
    let f = &rows[index];
    let shape = table::array_shape(rows, index)?;
    let child = rows[shape.len_row].slot;

    let budget = if cur.is_empty() {
        0
    } else {
        match f.kind {
            FieldKind::ArrayLen => cur.read_u32()? as usize,
            FieldKind::ArrayLenCStr => decimal_budget(cur)?,
            FieldKind::ArrayNoLen => cur.remaining(),
            _ => unreachable!("dispatched on length-family kinds"),
        }
    };
    let mut region = cur.take_region(budget)?;

    let start = sink.next_record(child);
    let mut count = 0usize;
    while !region.is_empty() {
        if shape.wire_elem_len {
            let elem_len = region.read_u32()? as usize;
            if elem_len == 0 {
                // Zero-length structure: benign gap.
                continue;
            }
            let mut elem = region.take_region(elem_len)?;
            sink.begin_record(child);
            walk_block(sink, rows, shape.body, shape.end, &mut elem, ctx)?;
            sink.end_record(child);
        } else {
            // Implied-structure convention: no element length on the wire;
            // fields are consumed straight from the budget region.
            sink.begin_record(child);
            walk_block(sink, rows, shape.body, shape.end, &mut region, ctx)?;
            sink.end_record(child);
        }
        count += 1;
    }

    finish_array(sink, f, &shape, rows, child, start, count);
    Ok(shape.end)
}

/// Count-prefixed array family: the wire carries an element count and the
/// loop runs exactly that many iterations (bounded by the region's end).
fn array_by_count<'a, S: Sink>(
    sink: &mut S,
    rows: &[Field],
    index: usize,
    cur: &mut Cursor<'a>,
    ctx: &mut Ctx<'a>,
) -> Result<usize, ParseError> {
    let f = &rows[index];
    let shape = table::array_shape(rows, index)?;
    let child = rows[shape.len_row].slot;

    let declared = if cur.is_empty() {
        0
    } else {
        cur.read_u32()? as usize
    };

    let start = sink.next_record(child);
    let mut count = 0usize;
    for _ in 0..declared {
        if cur.is_empty() {
            break;
        }
        if shape.wire_elem_len {
            let elem_len = cur.read_u32()? as usize;
            if elem_len == 0 {
                continue;
            }
            let mut elem = cur.take_region(elem_len)?;
            sink.begin_record(child);
            walk_block(sink, rows, shape.body, shape.end, &mut elem, ctx)?;
            sink.end_record(child);
        } else {
            sink.begin_record(child);
            walk_block(sink, rows, shape.body, shape.end, cur, ctx)?;
            sink.end_record(child);
        }
        count += 1;
    }

    finish_array(sink, f, &shape, rows, child, start, count);
    Ok(shape.end)
}

/// Null-terminated array family: the remainder of the response is a
/// sequence of NUL-terminated strings, one child record each. Always the
/// final block of a table.
fn array_null_terminated<S: Sink>(
    sink: &mut S,
    rows: &[Field],
    index: usize,
    cur: &mut Cursor<'_>,
) -> Result<usize, ParseError> {
    let f = &rows[index];
    let shape = table::array_shape(rows, index)?;
    let elem = &rows[shape.len_row];
    let child = elem.slot;

    let start = sink.next_record(child);
    let mut count = 0usize;
    while !cur.is_empty() {
        let b = cur.read_cstr()?;
        sink.begin_record(child);
        if b.is_empty() {
            sink.put(child, elem.name, Cell::Null);
        } else {
            sink.put_bytes(child, elem.name, b, true);
        }
        sink.end_record(child);
        count += 1;
    }

    finish_array(sink, f, &shape, rows, child, start, count);
    Ok(shape.end)
}

/// Parses a NUL-terminated decimal byte budget the way the wire's own
/// producers do: leading ASCII digits, zero when there are none.
fn decimal_budget(cur: &mut Cursor<'_>) -> Result<usize, ParseError> {
    let b = cur.read_cstr()?;
    let mut n = 0usize;
    for &d in b.iter().take_while(|d| d.is_ascii_digit()) {
        n = n.saturating_mul(10).saturating_add(usize::from(d - b'0'));
    }
    Ok(n)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::table::UNBOUNDED;

    /// `[StructLen, Int4 request_id, RetCode, RsnCode]` prologue shared by
    /// every table in these tests.
    fn header() -> Vec<Field> {
        vec![
            Field::new(FieldKind::StructLen, "base"),
            Field::new(FieldKind::Int4, "request_id"),
            Field::new(FieldKind::RetCode, "return_code"),
            Field::new(FieldKind::RsnCode, "reason_code"),
        ]
    }

    /// 12-byte response header.
    fn header_bytes(id: u32, rc: u32, rs: u32) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&id.to_be_bytes());
        b.extend_from_slice(&rc.to_be_bytes());
        b.extend_from_slice(&rs.to_be_bytes());
        b
    }

    fn decode(rows: &[Field], body: &[u8], mode: ErrorBufMode) -> (Sizes, OutputBuffer) {
        let sizes = scan(rows, body, mode).unwrap();
        let mut out = OutputBuffer::allocate(&sizes);
        populate(rows, body, mode, &mut out).unwrap();
        (sizes, out)
    }

    #[test]
    fn minimal_header_only_response() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::End, ""));
        let body = header_bytes(7, 0, 0);

        let (sizes, out) = decode(&rows, &body, ErrorBufMode::NotPossible);

        assert_eq!(sizes.string_bytes, 0);
        assert_eq!(sizes.slots[0].records, 1);
        assert_eq!(out.string_len(), 0);
        let base = out.base().unwrap();
        assert_eq!(base.int("request_id"), Some(7));
        assert_eq!(base.int("return_code"), Some(0));
        assert_eq!(base.int("reason_code"), Some(0));
    }

    #[test]
    fn every_scalar_kind_round_trips() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::Int1, "flag"));
        rows.push(Field::new(FieldKind::Int8, "big"));
        rows.push(Field::new(FieldKind::String, "name").sized(0, 64));
        rows.push(Field::new(FieldKind::CStr, "tag"));
        rows.push(Field::new(FieldKind::CharBuf, "blob").sized(0, UNBOUNDED));
        rows.push(Field::new(FieldKind::CharBufCount, "blob_count"));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        body.push(0xAB);
        body.extend_from_slice(&0xDEAD_BEEF_0000_0001u64.to_be_bytes());
        body.extend_from_slice(&4u32.to_be_bytes());
        body.extend_from_slice(b"LNX1");
        body.extend_from_slice(b"tagged\0");
        body.extend_from_slice(&3u32.to_be_bytes());
        body.extend_from_slice(&[9, 8, 7]);

        let (sizes, out) = decode(&rows, &body, ErrorBufMode::NotPossible);

        // "LNX1" + "tagged\0" + 3 raw bytes.
        assert_eq!(sizes.string_bytes, 4 + 7 + 3);
        let base = out.base().unwrap();
        assert_eq!(base.int("flag"), Some(0xAB));
        assert_eq!(base.int("big"), Some(0xDEAD_BEEF_0000_0001));
        assert_eq!(base.text("name").unwrap(), "LNX1");
        assert_eq!(base.text("tag").unwrap(), "tagged");
        assert_eq!(base.bytes("blob").unwrap(), &[9, 8, 7]);
        assert_eq!(base.count("blob_count"), Some(3));
    }

    #[test]
    fn scan_and_populate_agree_on_allocation() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ArrayCount, "entries"));
        rows.push(Field::new(FieldKind::ArrayStructCount, "entry_count"));
        rows.push(Field::new(FieldKind::StructLen, "entry").slot(1).level(1).sized(0, 4));
        rows.push(Field::new(FieldKind::Int4, "id").slot(1).level(1));
        rows.push(Field::new(FieldKind::CStr, "label").slot(1).level(1));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        body.extend_from_slice(&2u32.to_be_bytes());
        for (id, label) in [(10u32, b"aa".as_slice()), (11, b"bbb".as_slice())] {
            let elem_len = 4 + label.len() + 1;
            body.extend_from_slice(&u32::try_from(elem_len).unwrap().to_be_bytes());
            body.extend_from_slice(&id.to_be_bytes());
            body.extend_from_slice(label);
            body.push(0);
        }

        let sizes = scan(&rows, &body, ErrorBufMode::NotPossible).unwrap();
        assert_eq!(sizes.slots[1].records, 2);
        assert_eq!(sizes.string_bytes, 3 + 4);

        let mut out = OutputBuffer::allocate(&sizes);
        populate(&rows, &body, ErrorBufMode::NotPossible, &mut out).unwrap();
        // Populate must land exactly inside the scanned allocation.
        assert_eq!(out.string_len(), sizes.string_bytes);
        assert_eq!(out.record_count(1), sizes.slots[1].records);
    }

    #[test]
    fn string_length_outside_declared_range_fails() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::String, "name").sized(2, 4));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        body.extend_from_slice(&9u32.to_be_bytes());
        body.extend_from_slice(b"waytoobig");

        let err = scan(&rows, &body, ErrorBufMode::NotPossible).unwrap_err();
        match err {
            ParseError::InvalidStringSize {
                field,
                len,
                min,
                max,
                offset,
            } => {
                assert_eq!(field, "name");
                assert_eq!(len, 9);
                assert_eq!(min, 2);
                assert_eq!(max, 4);
                assert_eq!(offset, 12);
            }
            other => panic!("expected InvalidStringSize, got {other:?}"),
        }
    }

    #[test]
    fn zero_length_optional_string_is_null_not_empty() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::String, "name").sized(0, 8));
        rows.push(Field::new(FieldKind::CharBuf, "data").sized(0, 8));
        rows.push(Field::new(FieldKind::CharBufCount, "data_count"));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());

        let (sizes, out) = decode(&rows, &body, ErrorBufMode::NotPossible);
        assert_eq!(sizes.string_bytes, 0);
        let base = out.base().unwrap();
        assert!(!base.is_set("name"));
        assert!(!base.is_set("data"));
        assert_eq!(base.count("data_count"), Some(0));
    }

    #[test]
    fn count_zero_array_leaves_head_null_and_counter_zero() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ArrayCount, "entries"));
        rows.push(Field::new(FieldKind::ArrayStructCount, "entry_count"));
        rows.push(Field::new(FieldKind::StructLen, "entry").slot(1).level(1).sized(0, 4));
        rows.push(Field::new(FieldKind::Int4, "id").slot(1).level(1));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        body.extend_from_slice(&0u32.to_be_bytes());

        let (sizes, out) = decode(&rows, &body, ErrorBufMode::NotPossible);
        assert_eq!(sizes.slots[1].records, 0);
        let base = out.base().unwrap();
        assert!(!base.is_set("entries"));
        assert_eq!(base.count("entry_count"), Some(0));
        assert_eq!(base.records("entries").count(), 0);
    }

    #[test]
    fn length_prefixed_array_consumes_exact_budget() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ArrayLen, "entries"));
        rows.push(Field::new(FieldKind::StructLen, "entry").slot(1).level(1).sized(0, 4));
        rows.push(Field::new(FieldKind::Int4, "id").slot(1).level(1));
        rows.push(Field::new(FieldKind::Int4, "trailer"));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        // Two 8-byte elements (4-byte element length + 4-byte id).
        body.extend_from_slice(&16u32.to_be_bytes());
        for id in [5u32, 6] {
            body.extend_from_slice(&4u32.to_be_bytes());
            body.extend_from_slice(&id.to_be_bytes());
        }
        body.extend_from_slice(&0xCAFEu32.to_be_bytes());

        let (_, out) = decode(&rows, &body, ErrorBufMode::NotPossible);
        let base = out.base().unwrap();
        let ids: Vec<u64> = base.records("entries").map(|r| r.int("id").unwrap()).collect();
        assert_eq!(ids, [5, 6]);
        // The trailer after the array region still decodes.
        assert_eq!(base.int("trailer"), Some(0xCAFE));
    }

    #[test]
    fn zero_length_element_is_a_benign_gap() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ArrayLen, "entries"));
        rows.push(Field::new(FieldKind::ArrayStructCount, "entry_count"));
        rows.push(Field::new(FieldKind::StructLen, "entry").slot(1).level(1).sized(0, 4));
        rows.push(Field::new(FieldKind::Int4, "id").slot(1).level(1));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        body.extend_from_slice(&16u32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes()); // gap
        body.extend_from_slice(&4u32.to_be_bytes());
        body.extend_from_slice(&42u32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes()); // gap

        let (_, out) = decode(&rows, &body, ErrorBufMode::NotPossible);
        let base = out.base().unwrap();
        assert_eq!(base.count("entry_count"), Some(1));
        let ids: Vec<u64> = base.records("entries").map(|r| r.int("id").unwrap()).collect();
        assert_eq!(ids, [42]);
    }

    #[test]
    fn implied_structure_elements_without_wire_length() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ArrayLen, "pairs"));
        // max == 0: element length is not on the wire.
        rows.push(Field::new(FieldKind::StructLen, "pair").slot(2).level(1).sized(0, 0));
        rows.push(Field::new(FieldKind::Int4, "key").slot(2).level(1));
        rows.push(Field::new(FieldKind::Int4, "value").slot(2).level(1));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        body.extend_from_slice(&16u32.to_be_bytes());
        for (k, v) in [(1u32, 10u32), (2, 20)] {
            body.extend_from_slice(&k.to_be_bytes());
            body.extend_from_slice(&v.to_be_bytes());
        }

        let (_, out) = decode(&rows, &body, ErrorBufMode::NotPossible);
        let base = out.base().unwrap();
        let pairs: Vec<(u64, u64)> = base
            .records("pairs")
            .map(|r| (r.int("key").unwrap(), r.int("value").unwrap()))
            .collect();
        assert_eq!(pairs, [(1, 10), (2, 20)]);
    }

    #[test]
    fn rest_of_buffer_array_takes_everything() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ArrayNoLen, "entries"));
        rows.push(Field::new(FieldKind::StructLen, "entry").slot(1).level(1).sized(0, 0));
        rows.push(Field::new(FieldKind::Int4, "id").slot(1).level(1));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        for id in [1u32, 2, 3] {
            body.extend_from_slice(&id.to_be_bytes());
        }

        let (_, out) = decode(&rows, &body, ErrorBufMode::NotPossible);
        let ids: Vec<u64> = out
            .base()
            .unwrap()
            .records("entries")
            .map(|r| r.int("id").unwrap())
            .collect();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[test]
    fn cstr_budget_array() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ArrayLenCStr, "entries"));
        rows.push(Field::new(FieldKind::StructLen, "entry").slot(1).level(1).sized(0, 0));
        rows.push(Field::new(FieldKind::Int4, "id").slot(1).level(1));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        body.extend_from_slice(b"8\0");
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(&2u32.to_be_bytes());

        let (_, out) = decode(&rows, &body, ErrorBufMode::NotPossible);
        let ids: Vec<u64> = out
            .base()
            .unwrap()
            .records("entries")
            .map(|r| r.int("id").unwrap())
            .collect();
        assert_eq!(ids, [1, 2]);
    }

    #[test]
    fn null_terminated_array_counts_terminators() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ArrayNullTerm, "names"));
        rows.push(Field::new(FieldKind::ArrayStructCount, "name_count"));
        rows.push(Field::new(FieldKind::StructLen, "name").slot(1).level(1));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        body.extend_from_slice(b"abc\0de\0");

        let sizes = scan(&rows, &body, ErrorBufMode::NotPossible).unwrap();
        assert_eq!(sizes.slots[1].records, 2);
        assert_eq!(sizes.string_bytes, 7);

        let mut out = OutputBuffer::allocate(&sizes);
        populate(&rows, &body, ErrorBufMode::NotPossible, &mut out).unwrap();
        let base = out.base().unwrap();
        assert_eq!(base.count("name_count"), Some(2));
        let names: Vec<String> = base
            .records("names")
            .map(|r| r.text("name").unwrap().into_owned())
            .collect();
        assert_eq!(names, ["abc", "de"]);
    }

    #[test]
    fn nested_array_within_array() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ArrayCount, "groups"));
        rows.push(Field::new(FieldKind::StructLen, "group").slot(1).level(1).sized(0, 4));
        rows.push(Field::new(FieldKind::Int4, "group_id").slot(1).level(1));
        rows.push(Field::new(FieldKind::ArrayCount, "members").slot(1).level(1));
        rows.push(Field::new(FieldKind::StructLen, "member").slot(2).level(2).sized(0, 0));
        rows.push(Field::new(FieldKind::Int4, "member_id").slot(2).level(2));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        body.extend_from_slice(&2u32.to_be_bytes()); // two groups
        // group 1: id 1, members [11, 12]
        let mut g1 = Vec::new();
        g1.extend_from_slice(&1u32.to_be_bytes());
        g1.extend_from_slice(&2u32.to_be_bytes());
        g1.extend_from_slice(&11u32.to_be_bytes());
        g1.extend_from_slice(&12u32.to_be_bytes());
        body.extend_from_slice(&u32::try_from(g1.len()).unwrap().to_be_bytes());
        body.extend_from_slice(&g1);
        // group 2: id 2, no members
        let mut g2 = Vec::new();
        g2.extend_from_slice(&2u32.to_be_bytes());
        g2.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&u32::try_from(g2.len()).unwrap().to_be_bytes());
        body.extend_from_slice(&g2);

        let (_, out) = decode(&rows, &body, ErrorBufMode::NotPossible);
        let base = out.base().unwrap();
        let groups: Vec<(u64, Vec<u64>)> = base
            .records("groups")
            .map(|g| {
                (
                    g.int("group_id").unwrap(),
                    g.records("members").map(|m| m.int("member_id").unwrap()).collect(),
                )
            })
            .collect();
        assert_eq!(groups, [(1, vec![11, 12]), (2, vec![])]);
    }

    #[test]
    fn error_buffer_captured_on_nonzero_return_code() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ErrorBuf, "error_data"));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 8, 44);
        body.extend_from_slice(b"HCPCQV045E details");

        let (_, out) = decode(&rows, &body, ErrorBufMode::NoLengthField);
        let base = out.base().unwrap();
        assert_eq!(base.int("return_code"), Some(8));
        assert_eq!(base.text("error_data").unwrap(), "HCPCQV045E details");
    }

    #[test]
    fn error_buffer_with_length_field_leaves_trailing_bytes() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ErrorBuf, "error_data"));
        rows.push(Field::new(FieldKind::Int4, "extra"));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 4, 9);
        body.extend_from_slice(&3u32.to_be_bytes());
        body.extend_from_slice(b"err");
        body.extend_from_slice(&5u32.to_be_bytes());

        let (_, out) = decode(&rows, &body, ErrorBufMode::WithLengthField);
        let base = out.base().unwrap();
        assert_eq!(base.text("error_data").unwrap(), "err");
        assert_eq!(base.int("extra"), Some(5));
    }

    #[test]
    fn error_buffer_absent_on_success() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ErrorBuf, "error_data"));
        rows.push(Field::new(FieldKind::End, ""));

        let body = header_bytes(1, 0, 0);
        let (sizes, out) = decode(&rows, &body, ErrorBufMode::NoLengthField);
        assert_eq!(sizes.string_bytes, 0);
        assert!(!out.base().unwrap().is_set("error_data"));
    }

    #[test]
    fn truncated_trailing_fields_decode_null() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::Int4, "optional_a"));
        rows.push(Field::new(FieldKind::String, "optional_b"));
        rows.push(Field::new(FieldKind::End, ""));

        // Down-level server: header only.
        let body = header_bytes(3, 0, 0);
        let (_, out) = decode(&rows, &body, ErrorBufMode::NotPossible);
        let base = out.base().unwrap();
        assert_eq!(base.int("request_id"), Some(3));
        assert!(!base.is_set("optional_a"));
        assert!(!base.is_set("optional_b"));
    }

    #[test]
    fn declared_budget_past_end_is_truncated_error() {
        let mut rows = header();
        rows.push(Field::new(FieldKind::ArrayLen, "entries"));
        rows.push(Field::new(FieldKind::StructLen, "entry").slot(1).level(1).sized(0, 4));
        rows.push(Field::new(FieldKind::Int4, "id").slot(1).level(1));
        rows.push(Field::new(FieldKind::End, ""));

        let mut body = header_bytes(1, 0, 0);
        body.extend_from_slice(&64u32.to_be_bytes()); // claims more than remains

        let err = scan(&rows, &body, ErrorBufMode::NotPossible).unwrap_err();
        assert!(matches!(err, ParseError::Truncated { .. }));
    }
}
