//! Directory block codec
//!
//! Each directory is serialized as one block: a flat run of tagged records,
//! all integers u32 little-endian.
//!
//! ```text
//! tag 1  directory: pos, size, time, name\0
//! tag 0  resource:  pos, size, time, id, type, key count, name\0, comment\0,
//!                   keys (key count x u32)
//! ```
//!
//! Blocks are written post-order at the append cursor, so a parent's record
//! of a child always carries the child's final position and size. Space held
//! by earlier copies of a block is never reclaimed.

use crate::core::dir::DirId;
use crate::core::error::{RezError, Result};
use crate::core::io::{FileId, FileRef};
use crate::core::mgr::RezMgr;
use crate::core::types::TypeTag;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};
use tracing::{debug, trace};

pub const DIR_RECORD: u32 = 1;
pub const REZ_RECORD: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRecord {
    pub pos: u32,
    pub size: u32,
    pub time: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RezRecord {
    pub pos: u32,
    pub size: u32,
    pub time: u32,
    pub id: u32,
    pub type_tag: TypeTag,
    pub name: String,
    pub comment: String,
    pub keys: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Dir(DirRecord),
    Rez(RezRecord),
}

fn write_cstr<W: Write>(out: &mut W, s: &str) -> std::io::Result<()> {
    out.write_all(s.as_bytes())?;
    out.write_u8(0)
}

fn read_cstr(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let buf = *cursor.get_ref();
    let start = cursor.position() as usize;
    let len = buf
        .get(start..)
        .and_then(|rest| rest.iter().position(|&b| b == 0))
        .ok_or(RezError::Truncated)?;

    cursor.set_position((start + len + 1) as u64);
    Ok(String::from_utf8_lossy(&buf[start..start + len]).into_owned())
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| RezError::Truncated)
}

pub fn encode_dir_block(records: &[Record]) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    for record in records {
        match record {
            Record::Dir(dir) => {
                out.write_u32::<LittleEndian>(DIR_RECORD)?;
                out.write_u32::<LittleEndian>(dir.pos)?;
                out.write_u32::<LittleEndian>(dir.size)?;
                out.write_u32::<LittleEndian>(dir.time)?;
                write_cstr(&mut out, &dir.name)?;
            }
            Record::Rez(rez) => {
                out.write_u32::<LittleEndian>(REZ_RECORD)?;
                out.write_u32::<LittleEndian>(rez.pos)?;
                out.write_u32::<LittleEndian>(rez.size)?;
                out.write_u32::<LittleEndian>(rez.time)?;
                out.write_u32::<LittleEndian>(rez.id)?;
                out.write_u32::<LittleEndian>(rez.type_tag.0)?;
                out.write_u32::<LittleEndian>(rez.keys.len() as u32)?;
                write_cstr(&mut out, &rez.name)?;
                write_cstr(&mut out, &rez.comment)?;
                for &key in &rez.keys {
                    out.write_u32::<LittleEndian>(key)?;
                }
            }
        }
    }

    Ok(out)
}

pub fn decode_dir_block(buf: &[u8]) -> Result<Vec<Record>> {
    let mut cursor = Cursor::new(buf);
    let mut records = Vec::new();

    while (cursor.position() as usize) < buf.len() {
        match read_u32(&mut cursor)? {
            DIR_RECORD => {
                let pos = read_u32(&mut cursor)?;
                let size = read_u32(&mut cursor)?;
                let time = read_u32(&mut cursor)?;
                let name = read_cstr(&mut cursor)?;
                records.push(Record::Dir(DirRecord {
                    pos,
                    size,
                    time,
                    name,
                }));
            }
            REZ_RECORD => {
                let pos = read_u32(&mut cursor)?;
                let size = read_u32(&mut cursor)?;
                let time = read_u32(&mut cursor)?;
                let id = read_u32(&mut cursor)?;
                let type_tag = TypeTag(read_u32(&mut cursor)?);
                let num_keys = read_u32(&mut cursor)?;
                let name = read_cstr(&mut cursor)?;
                let comment = read_cstr(&mut cursor)?;

                let remaining = buf.len() - cursor.position() as usize;
                if num_keys as usize > remaining / 4 {
                    return Err(RezError::Truncated);
                }
                let keys = (0..num_keys)
                    .map(|_| read_u32(&mut cursor))
                    .collect::<Result<Vec<_>>>()?;

                records.push(Record::Rez(RezRecord {
                    pos,
                    size,
                    time,
                    id,
                    type_tag,
                    name,
                    comment,
                    keys,
                }));
            }
            tag => return Err(RezError::BadRecordTag(tag)),
        }
    }

    Ok(records)
}

/// One decoded directory block with the blocks of its subdirectories,
/// held back until the whole tree has been read
#[derive(Debug, Default)]
pub(crate) struct StagedDir {
    records: Vec<StagedRecord>,
}

#[derive(Debug)]
enum StagedRecord {
    Dir(DirRecord, StagedDir),
    Rez(RezRecord),
}

impl RezMgr {
    /// Read a directory tree from `file` and merge it into `dir`.
    /// Nothing is merged unless every block decodes.
    pub(crate) fn read_all_dirs(
        &mut self,
        dir: DirId,
        file: FileId,
        pos: u32,
        size: u32,
        overwrite_items: bool,
    ) -> Result<()> {
        let staged = self.stage_dir_tree(file, pos, size)?;
        self.merge_dir_tree(dir, file, staged, overwrite_items)
    }

    /// Decode a block and, recursively, every block its directory records point at
    pub(crate) fn stage_dir_tree(&mut self, file: FileId, pos: u32, size: u32) -> Result<StagedDir> {
        if size == 0 {
            return Ok(StagedDir::default());
        }

        let records = self
            .read_dir_block(file, pos, size)?
            .into_iter()
            .map(|record| match record {
                Record::Dir(rec) => {
                    let sub = if rec.pos != 0 {
                        self.stage_dir_tree(file, rec.pos, rec.size)?
                    } else {
                        StagedDir::default()
                    };
                    Ok(StagedRecord::Dir(rec, sub))
                }
                Record::Rez(rec) => Ok(StagedRecord::Rez(rec)),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(StagedDir { records })
    }

    pub(crate) fn read_dir_block(&mut self, file: FileId, pos: u32, size: u32) -> Result<Vec<Record>> {
        let mut buf = vec![0u8; size as usize];
        let backing = self.files.get_mut(file.0).ok_or(RezError::InvalidHandle)?;
        let n = backing.read(None, pos, 0, &mut buf, self.handler.as_mut())?;
        if n != buf.len() {
            return Err(RezError::Truncated);
        }
        let records = decode_dir_block(&buf)?;
        debug!("Read directory block at {} ({} records)", pos, records.len());
        Ok(records)
    }

    /// Merge decoded records into `dir`. Children the block does not mention
    /// keep `dir_pos == 0`.
    pub(crate) fn merge_dir_tree(
        &mut self,
        dir: DirId,
        file: FileId,
        staged: StagedDir,
        overwrite_items: bool,
    ) -> Result<()> {
        if staged.records.is_empty() {
            return Ok(());
        }

        for child in self.dirs.subdirs(dir) {
            self.dir_mut(child)?.dir_pos = 0;
        }
        self.dir_mut(dir)?.items_size = 0;
        let mut items_pos: Option<u32> = None;

        for record in staged.records {
            match record {
                StagedRecord::Dir(rec, sub) => {
                    let child = match self.get_dir(dir, &rec.name) {
                        Some(child) => {
                            let d = self.dir_mut(child)?;
                            d.dir_pos = rec.pos;
                            d.dir_size = rec.size;
                            d.time = rec.time;
                            child
                        }
                        None => self.attach_dir(dir, &rec.name, rec.pos, rec.size, rec.time)?,
                    };
                    self.merge_dir_tree(child, file, sub, overwrite_items)?;
                }
                StagedRecord::Rez(rec) => {
                    if let Some(existing) = self.get_rez(dir, &rec.name, rec.type_tag) {
                        if !overwrite_items {
                            trace!("Skipping duplicate {}", rec.name);
                            continue;
                        }
                        self.remove_rez_internal(existing)?;
                    }

                    let file_ref = FileRef { file, entry: None };
                    let item =
                        self.create_rez_internal(dir, rec.type_tag, &rec.name, rec.id, Some(file_ref))?;
                    let it = self.item_mut(item)?;
                    it.size = rec.size;
                    it.file_pos = rec.pos;
                    it.time = rec.time;
                    it.comment = rec.comment;
                    it.keys = rec.keys;

                    let d = self.dir_mut(dir)?;
                    d.items_size = d.items_size.saturating_add(rec.size);
                    items_pos = Some(items_pos.map_or(rec.pos, |p| p.min(rec.pos)));
                }
            }
        }

        self.dir_mut(dir)?.items_pos = items_pos.unwrap_or(0);
        Ok(())
    }

    /// Write every child's block, then this directory's own; returns the
    /// position and size of this directory's block
    pub(crate) fn write_all_dirs(&mut self, dir: DirId) -> Result<(u32, u32)> {
        for child in self.dirs.subdirs(dir) {
            let (pos, size) = self.write_all_dirs(child)?;
            let d = self.dir_mut(child)?;
            d.dir_pos = pos;
            d.dir_size = size;
        }
        self.write_dir_block(dir)
    }

    pub(crate) fn write_dir_block(&mut self, dir: DirId) -> Result<(u32, u32)> {
        let bytes = encode_dir_block(&self.dir_records(dir)?)?;
        let pos = self.next_write_pos;
        let size = u32::try_from(bytes.len()).map_err(|_| RezError::ArchiveFull)?;
        let end = pos.checked_add(size).ok_or(RezError::ArchiveFull)?;

        let primary = self.files.first_mut().ok_or(RezError::NotOpen)?;
        primary.write(None, pos, 0, &bytes, self.handler.as_mut())?;
        self.next_write_pos = end;

        trace!("Wrote directory block at {} ({} bytes)", pos, size);
        Ok((pos, size))
    }

    /// Records of a directory: child directories, then items type by type
    fn dir_records(&self, dir: DirId) -> Result<Vec<Record>> {
        let mut records = Vec::new();

        for child in self.dirs.subdirs(dir) {
            let d = self.dir_ref(child)?;
            records.push(Record::Dir(DirRecord {
                pos: d.dir_pos,
                size: d.dir_size,
                time: d.time,
                name: d.name.clone(),
            }));
        }

        for item in self.dir_items(dir) {
            let it = self.item_ref(item)?;
            records.push(Record::Rez(RezRecord {
                pos: it.file_pos,
                size: it.size,
                time: it.time,
                id: it.id,
                type_tag: it.type_tag,
                name: it.name.clone(),
                comment: it.comment.clone(),
                keys: it.keys.clone(),
            }));
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<Record> {
        vec![
            Record::Dir(DirRecord {
                pos: 400,
                size: 37,
                time: 11,
                name: "SPRITES".to_string(),
            }),
            Record::Rez(RezRecord {
                pos: 168,
                size: 12,
                time: 12,
                id: 2_000_000_000,
                type_tag: TypeTag::from("PCX"),
                name: "ROCK".to_string(),
                comment: "mossy".to_string(),
                keys: vec![3, 9],
            }),
        ]
    }

    #[test]
    fn test_record_layout() {
        let bytes = encode_dir_block(&sample()).unwrap();

        // Directory record
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &400u32.to_le_bytes());
        assert_eq!(&bytes[16..24], b"SPRITES\0");

        // Resource record follows directly
        let rez = &bytes[24..];
        assert_eq!(&rez[0..4], &[0, 0, 0, 0]);
        assert_eq!(&rez[20..24], &0x0050_4358u32.to_le_bytes());
        assert_eq!(&rez[24..28], &2u32.to_le_bytes());
        assert_eq!(&rez[28..39], b"ROCK\0mossy\0");
        assert_eq!(&rez[39..43], &3u32.to_le_bytes());
        assert_eq!(rez.len(), 47);
    }

    #[test]
    fn test_decode_matches_encode() {
        let records = sample();
        let bytes = encode_dir_block(&records).unwrap();
        assert_eq!(decode_dir_block(&bytes).unwrap(), records);
    }

    #[test]
    fn test_empty_block() {
        assert!(encode_dir_block(&[]).unwrap().is_empty());
        assert!(decode_dir_block(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_block() {
        let bytes = encode_dir_block(&sample()).unwrap();
        for cut in [3, 10, 20, bytes.len() - 2] {
            assert!(
                matches!(decode_dir_block(&bytes[..cut]), Err(RezError::Truncated)),
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn test_unknown_tag() {
        let bytes = 7u32.to_le_bytes();
        assert!(matches!(
            decode_dir_block(&bytes),
            Err(RezError::BadRecordTag(7))
        ));
    }

    #[test]
    fn test_huge_key_count_rejected() {
        let mut bytes = encode_dir_block(&sample()).unwrap();
        // key count of the resource record
        bytes[24 + 24..24 + 28].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(decode_dir_block(&bytes), Err(RezError::Truncated)));
    }
}
