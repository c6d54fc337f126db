//! Archive handle configuration
//!
//! Set once before an archive is opened. Changing bin counts between sessions
//! is harmless: the tables are rebuilt from the directory blocks on open.

use crate::core::error::{RezError, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

pub const DEFAULT_BY_NAME_BINS: usize = 19;
pub const DEFAULT_BY_ID_BINS: usize = 19;
pub const DEFAULT_DIR_BINS: usize = 5;
pub const DEFAULT_TYPE_BINS: usize = 9;
pub const DEFAULT_MAX_OPEN_FILES: usize = 3;
pub const DEFAULT_ITEM_CHUNK_SIZE: usize = 100;
pub const DEFAULT_FIRST_GENERATED_ID: u32 = 2_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RezConfig {
    /// Bins of each type bucket's by-name item table
    pub by_name_bins: usize,

    /// Bins of each type bucket's by-ID item table
    pub by_id_bins: usize,

    /// Bins of each directory's subdirectory table
    pub dir_bins: usize,

    /// Bins of each directory's type table
    pub type_bins: usize,

    /// Maintain by-ID item tables
    pub item_by_id: bool,

    /// Compare names case-sensitively; when off, names scanned from an
    /// emulated directory are upper-cased
    pub case_sensitive: bool,

    /// Characters that separate path components. `None` treats anything
    /// outside `' '..='.'` and ASCII alphanumerics as a separator.
    pub dir_separators: Option<String>,

    /// Cap on simultaneously open OS handles for an emulated directory
    pub max_open_files: usize,

    /// Item records allocated per pool chunk
    pub item_chunk_size: usize,

    /// Give a colliding ID the next generated ID instead of applying the
    /// overwrite policy
    pub renumber_id_collisions: bool,

    /// First ID handed out by the ID counter of a new archive
    pub first_generated_id: u32,

    /// Title written into the header of a new archive
    pub user_title: String,
}

impl Default for RezConfig {
    fn default() -> Self {
        RezConfig {
            by_name_bins: DEFAULT_BY_NAME_BINS,
            by_id_bins: DEFAULT_BY_ID_BINS,
            dir_bins: DEFAULT_DIR_BINS,
            type_bins: DEFAULT_TYPE_BINS,
            item_by_id: false,
            case_sensitive: false,
            dir_separators: None,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            item_chunk_size: DEFAULT_ITEM_CHUNK_SIZE,
            renumber_id_collisions: true,
            first_generated_id: DEFAULT_FIRST_GENERATED_ID,
            user_title: String::new(),
        }
    }
}

impl RezConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RezConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("by_name_bins", self.by_name_bins),
            ("by_id_bins", self.by_id_bins),
            ("dir_bins", self.dir_bins),
            ("type_bins", self.type_bins),
            ("max_open_files", self.max_open_files),
            ("item_chunk_size", self.item_chunk_size),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, count)| *count == 0) {
            return Err(RezError::Config(format!("{} must be non-zero", name)));
        }

        if self.dir_separators.as_deref() == Some("") {
            return Err(RezError::Config(
                "dir_separators must name at least one character".to_string(),
            ));
        }

        Ok(())
    }
}

/// Recoverability hook for failed OS calls
///
/// Called with the error of a failed seek, read, write, open, close or flush.
/// Returning `true` retries the call (the condition is expected to be fixed
/// externally, e.g. disk space freed); `false` fails the operation.
pub trait DiskErrorHandler {
    fn disk_error(&mut self, error: &io::Error) -> bool;
}

impl<F> DiskErrorHandler for F
where
    F: FnMut(&io::Error) -> bool,
{
    fn disk_error(&mut self, error: &io::Error) -> bool {
        self(error)
    }
}

/// Default hook: every disk error is fatal
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetry;

impl DiskErrorHandler for NoRetry {
    fn disk_error(&mut self, _error: &io::Error) -> bool {
        false
    }
}
