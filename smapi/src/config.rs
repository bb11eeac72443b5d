//! Connection settings and JSON persistence.

use std::path::{Path, PathBuf};
use std::{fs, io};

use serde::{Deserialize, Serialize};

/// Port SMAPI servers conventionally listen on.
pub const DEFAULT_PORT: u16 = 44444;

/// Connection settings for one SMAPI server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Config {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Authorized userid sent in every request prologue.
    pub userid: String,
    /// Password for `userid`.
    pub password: String,
    /// Socket read/write timeout in seconds; `None` blocks indefinitely.
    pub timeout_secs: Option<u64>,
    /// Directory for diagnostic dumps; `None` disables dumping.
    pub dump_dir: Option<PathBuf>,
}

impl Config {
    /// Settings for `host` on the conventional port.
    pub fn new(
        host: impl Into<String>,
        userid: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            userid: userid.into(),
            password: password.into(),
            timeout_secs: None,
            dump_dir: None,
        }
    }

    /// Loads settings from a JSON file.
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Persists settings to a JSON file.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
}
