//! Bounded raw-response dumps for offline triage.
//!
//! A string-size mismatch means the field table and the server disagree
//! about the wire layout; the undecodable body is written out (truncated
//! to [`DUMP_LIMIT`]) so the mismatch can be diagnosed after the fact.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Most bytes a single dump file may hold.
pub const DUMP_LIMIT: usize = 5000;

/// Per-process dump sequence number, to keep file names unique.
static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Writes `body` (truncated to [`DUMP_LIMIT`]) into `dir`, returning the
/// file path.
pub(crate) fn write(dir: &Path, function: &str, body: &[u8]) -> io::Result<PathBuf> {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let path = dir.join(format!(
        "smapi-{function}-{pid}-{seq}.dump",
        pid = std::process::id()
    ));
    let mut file = std::fs::File::create(&path)?;
    file.write_all(&body[..body.len().min(DUMP_LIMIT)])?;
    file.sync_all()?;
    Ok(path)
}
