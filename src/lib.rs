//! # RezMgr - Hierarchical Resource Archives
//!
//! `rezmgr` reads and writes resource archives: a header followed by
//! append-only payloads and directory blocks, indexed in memory by linked
//! hash tables. Features:
//!
//! - **Directory tree** of type buckets holding named, optionally numbered
//!   resources
//! - **Directory emulation**: open a real directory as if it were an archive,
//!   with a bounded number of OS handles
//! - **Overlays**: layer further archives or directories over an open one
//! - **Lazy or bulk loading** of payloads
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rezmgr::{RezMgr, Result, TypeTag};
//!
//! # fn main() -> Result<()> {
//! let mut mgr = RezMgr::new();
//! mgr.open("level1.rez", false, true)?;
//!
//! let root = mgr.root_dir().expect("archive is open");
//! let sprites = mgr.create_dir(root, "SPRITES")?;
//! let rock = mgr.create_rez(sprites, "ROCK", TypeTag::from("PCX"))?;
//! mgr.create(rock, 4)?.copy_from_slice(b"\x0a\x05\x01\x08");
//! mgr.save(rock)?;
//! mgr.close()?;
//!
//! mgr.open("level1.rez", true, false)?;
//! let rock = mgr.get_rez_from_path("\\SPRITES\\ROCK", TypeTag::from("PCX"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Overlays
//!
//! ```rust,no_run
//! use rezmgr::{RezMgr, Result};
//!
//! # fn main() -> Result<()> {
//! let mut mgr = RezMgr::new();
//! mgr.open("base.rez", true, false)?;
//! // Loose files in `patch/` replace same-named resources
//! mgr.open_additional("patch", true)?;
//! let item = mgr.get_rez_from_dos_path("\\SPRITES\\ROCK.PCX");
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    config::{DiskErrorHandler, NoRetry, RezConfig},
    dir::{DirId, RezDir, RezType},
    error::{RezError, Result},
    header::{Header, HEADER_SIZE},
    io::{BackingFile, FileId, FileRef},
    item::RezItem,
    mgr::RezMgr,
    pool::ItemId,
    types::{str_to_type, type_to_str, TypeTag},
};
