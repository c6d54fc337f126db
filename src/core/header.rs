use crate::core::error::{RezError, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Only accepted value of the version field
pub const FORMAT_VERSION: u32 = 1;

/// Serialized header size in bytes
pub const HEADER_SIZE: usize = 168;

/// Width of the file-type and user-title text fields
pub const TEXT_LEN: usize = 60;

/// File-type text stamped into every archive this crate writes
pub const FILE_TYPE: &[u8] = b"RezMgr Version 1 Copyright (C) 1995 MONOLITH INC.";

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;
const EOF_MARK: u8 = 0x1A;

const FILE_TYPE_OFFSET: usize = 2;
const USER_TITLE_OFFSET: usize = 64;
const FIELDS_OFFSET: usize = 127;
const IS_SORTED_OFFSET: usize = FIELDS_OFFSET + 10 * 4;

/// Control bytes bracketing the text fields, with their offsets
const MAGIC: [(usize, u8); 7] = [
    (0, CR),
    (1, LF),
    (62, CR),
    (63, LF),
    (124, CR),
    (125, LF),
    (126, EOF_MARK),
];

/// Archive header
///
/// Packed little-endian layout:
///
/// ```text
///   0  CR LF
///   2  file type, 60 bytes, space padded
///  62  CR LF
///  64  user title, 60 bytes, space padded
/// 124  CR LF EOF(0x1A)
/// 127  version, root dir pos/size/time, next write pos, time,
///      largest key array, largest dir name, largest rez name,
///      largest comment (ten u32)
/// 167  is-sorted flag (u8)
/// ```
///
/// The "largest" fields only presize read buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub file_type: [u8; TEXT_LEN],
    pub user_title: [u8; TEXT_LEN],
    pub version: u32,
    pub root_dir_pos: u32,
    pub root_dir_size: u32,
    pub root_dir_time: u32,
    pub next_write_pos: u32,
    pub time: u32,
    pub largest_key_ary: u32,
    pub largest_dir_name_size: u32,
    pub largest_rez_name_size: u32,
    pub largest_comment_size: u32,
    pub is_sorted: bool,
}

impl Header {
    pub fn new() -> Self {
        Header {
            file_type: pad_text(FILE_TYPE),
            user_title: [b' '; TEXT_LEN],
            version: FORMAT_VERSION,
            root_dir_pos: 0,
            root_dir_size: 0,
            root_dir_time: 0,
            next_write_pos: HEADER_SIZE as u32,
            time: 0,
            largest_key_ary: 0,
            largest_dir_name_size: 0,
            largest_rez_name_size: 0,
            largest_comment_size: 0,
            is_sorted: false,
        }
    }

    /// User title with the padding removed
    pub fn title(&self) -> String {
        let end = self
            .user_title
            .iter()
            .rposition(|&b| b != b' ' && b != 0)
            .map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.user_title[..end]).into_owned()
    }

    /// Set the user title, truncated to the field width
    pub fn set_title(&mut self, title: &str) {
        self.user_title = pad_text(title.as_bytes());
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(RezError::UnsupportedVersion(self.version));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];

        for (offset, value) in MAGIC {
            bytes[offset] = value;
        }
        bytes[FILE_TYPE_OFFSET..FILE_TYPE_OFFSET + TEXT_LEN].copy_from_slice(&self.file_type);
        bytes[USER_TITLE_OFFSET..USER_TITLE_OFFSET + TEXT_LEN].copy_from_slice(&self.user_title);

        let fields = [
            self.version,
            self.root_dir_pos,
            self.root_dir_size,
            self.root_dir_time,
            self.next_write_pos,
            self.time,
            self.largest_key_ary,
            self.largest_dir_name_size,
            self.largest_rez_name_size,
            self.largest_comment_size,
        ];
        LittleEndian::write_u32_into(&fields, &mut bytes[FIELDS_OFFSET..IS_SORTED_OFFSET]);
        bytes[IS_SORTED_OFFSET] = u8::from(self.is_sorted);

        bytes
    }

    /// Parse and validate a header; every magic byte and the version must match
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(RezError::Truncated);
        }

        if let Some(&(offset, _)) = MAGIC.iter().find(|&&(offset, value)| bytes[offset] != value) {
            return Err(RezError::InvalidMagic { offset });
        }

        let mut fields = [0u32; 10];
        LittleEndian::read_u32_into(&bytes[FIELDS_OFFSET..IS_SORTED_OFFSET], &mut fields);

        let mut header = Header::new();
        header
            .file_type
            .copy_from_slice(&bytes[FILE_TYPE_OFFSET..FILE_TYPE_OFFSET + TEXT_LEN]);
        header
            .user_title
            .copy_from_slice(&bytes[USER_TITLE_OFFSET..USER_TITLE_OFFSET + TEXT_LEN]);

        let [version, root_dir_pos, root_dir_size, root_dir_time, next_write_pos, time, largest_key_ary, largest_dir_name_size, largest_rez_name_size, largest_comment_size] =
            fields;
        header.version = version;
        header.root_dir_pos = root_dir_pos;
        header.root_dir_size = root_dir_size;
        header.root_dir_time = root_dir_time;
        header.next_write_pos = next_write_pos;
        header.time = time;
        header.largest_key_ary = largest_key_ary;
        header.largest_dir_name_size = largest_dir_name_size;
        header.largest_rez_name_size = largest_rez_name_size;
        header.largest_comment_size = largest_comment_size;
        header.is_sorted = bytes[IS_SORTED_OFFSET] != 0;

        header.validate()?;

        Ok(header)
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

fn pad_text(text: &[u8]) -> [u8; TEXT_LEN] {
    let mut field = [b' '; TEXT_LEN];
    let len = text.len().min(TEXT_LEN);
    field[..len].copy_from_slice(&text[..len]);
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut header = Header::new();
        header.root_dir_pos = 0x1122_3344;
        header.is_sorted = true;
        let bytes = header.to_bytes();

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..2], &[CR, LF]);
        assert_eq!(&bytes[2..2 + FILE_TYPE.len()], FILE_TYPE);
        assert_eq!(bytes[2 + FILE_TYPE.len()], b' ');
        assert_eq!(&bytes[124..127], &[CR, LF, EOF_MARK]);
        assert_eq!(&bytes[127..131], &[1, 0, 0, 0]);
        assert_eq!(&bytes[131..135], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(bytes[167], 1);
    }

    #[test]
    fn test_header_round_trip() {
        let mut header = Header::new();
        header.set_title("Level art");
        header.root_dir_pos = 1000;
        header.root_dir_size = 40;
        header.next_write_pos = 1000;
        header.largest_comment_size = 12;

        let parsed = Header::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.title(), "Level art");
    }

    #[test]
    fn test_title_truncated_and_trimmed() {
        let mut header = Header::new();
        header.set_title(&"x".repeat(80));
        assert_eq!(header.title().len(), TEXT_LEN);

        header.set_title("");
        assert_eq!(header.title(), "");
    }

    #[test]
    fn test_invalid_magic() {
        for (offset, _) in MAGIC {
            let mut bytes = Header::new().to_bytes();
            bytes[offset] = b'Z';
            assert!(matches!(
                Header::from_bytes(&bytes),
                Err(RezError::InvalidMagic { offset: o }) if o == offset
            ));
        }
    }

    #[test]
    fn test_invalid_version() {
        let mut header = Header::new();
        header.version = 2;
        assert!(matches!(
            Header::from_bytes(&header.to_bytes()),
            Err(RezError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_truncated() {
        let bytes = Header::new().to_bytes();
        assert!(matches!(
            Header::from_bytes(&bytes[..100]),
            Err(RezError::Truncated)
        ));
    }
}
