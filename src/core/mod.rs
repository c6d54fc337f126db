//! Archive engine
//!
//! Leaves first: the intrusive [`list`] and the [`hash`] table built on it,
//! the [`pool`] of item records, the backing-file layer in [`io`], the
//! directory/type/item model in [`dir`] and [`item`], the on-disk [`header`]
//! and directory-block [`codec`], and the [`mgr::RezMgr`] archive handle.

pub mod codec;
pub mod config;
pub mod dir;
pub mod error;
pub mod hash;
pub mod header;
pub mod io;
pub mod item;
pub mod list;
pub mod mgr;
pub mod path;
pub mod payload;
pub mod pool;
pub mod types;


pub use mgr::RezMgr;
