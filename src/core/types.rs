//! Resource type tags
//!
//! A type is a 4-byte identifier packed from up to four ASCII characters,
//! right-aligned: the last character sits in the low-order byte. Tag `0` is
//! the "no type" value used for names without a usable extension.

use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeTag(pub u32);

impl TypeTag {
    pub const NONE: TypeTag = TypeTag(0);

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for TypeTag {
    fn from(value: u32) -> Self {
        TypeTag(value)
    }
}

impl From<&str> for TypeTag {
    fn from(s: &str) -> Self {
        str_to_type(s)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&type_to_str(*self))
    }
}

/// Pack up to four characters into a tag; longer input keeps its first four
pub fn str_to_type(s: &str) -> TypeTag {
    let bytes = &s.as_bytes()[..s.len().min(4)];
    let tag = bytes
        .iter()
        .fold(0u32, |tag, &b| (tag << 8) | u32::from(b));
    TypeTag(tag)
}

/// Unpack a tag; its length is taken from the highest non-zero byte
pub fn type_to_str(tag: TypeTag) -> String {
    let bytes = tag.0.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].iter().map(|&b| char::from(b)).collect()
}
