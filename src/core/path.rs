//! Resource path handling
//!
//! Paths name a chain of directories followed by a resource name. Which
//! characters separate the components is configurable; by default every
//! character outside `' '..='.'` and the ASCII letters and digits is a
//! separator, so `\`, `/` and `:` all work.

use crate::core::types::{str_to_type, TypeTag};

/// Longest file extension, dot included, that still yields a type tag
const MAX_DOS_EXT_LEN: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Separators {
    custom: Option<Vec<char>>,
}

impl Separators {
    pub fn new(custom: Option<&str>) -> Self {
        Separators {
            custom: custom.map(|set| set.chars().collect()),
        }
    }

    /// Whether `c` may appear inside a directory or resource name
    pub fn is_name_char(&self, c: char) -> bool {
        match &self.custom {
            Some(set) => !set.contains(&c),
            None => matches!(c, ' '..='.' | '0'..='9' | 'A'..='Z' | 'a'..='z'),
        }
    }

    pub fn is_separator(&self, c: char) -> bool {
        !self.is_name_char(c)
    }

    /// Whether `c` is in an explicitly configured separator set. The default
    /// character classes only apply to lookups, never to new names.
    pub fn is_configured_separator(&self, c: char) -> bool {
        self.custom.as_ref().map_or(false, |set| set.contains(&c))
    }

    /// Directory names along `path`; leading, trailing and repeated
    /// separators are ignored
    pub fn components<'a>(&self, path: &'a str) -> Vec<&'a str> {
        path.split(|c| self.is_separator(c))
            .filter(|part| !part.is_empty())
            .collect()
    }

    /// Split `path` at its last separator into a directory part and a
    /// resource name. A path without separators is just a name.
    pub fn split_last<'a>(&self, path: &'a str) -> (Option<&'a str>, &'a str) {
        match path.char_indices().rev().find(|&(_, c)| self.is_separator(c)) {
            Some((i, c)) => (Some(&path[..i]), &path[i + c.len_utf8()..]),
            None => (None, path),
        }
    }
}

/// Split a DOS-style file name into a resource name and a type tag
///
/// The extension (upper-cased) becomes the type. An extension longer than
/// four characters is left in the name and the type is [`TypeTag::NONE`].
pub fn split_dos_name(file_name: &str) -> (&str, TypeTag) {
    let Some(dot) = file_name.rfind('.') else {
        return (file_name, TypeTag::NONE);
    };

    let ext = &file_name[dot..];
    if ext.len() > MAX_DOS_EXT_LEN {
        return (file_name, TypeTag::NONE);
    }

    let tag = str_to_type(&ext[1..].to_ascii_uppercase());
    (&file_name[..dot], tag)
}
