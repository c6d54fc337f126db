use thiserror::Error;

#[derive(Error, Debug)]
pub enum RezError {
    #[error("Invalid magic byte in header at offset {offset}")]
    InvalidMagic { offset: usize },

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("Archive data truncated")]
    Truncated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Archive is not open")]
    NotOpen,

    #[error("Archive is already open")]
    AlreadyOpen,

    #[error("Archive is opened read-only")]
    ReadOnly,

    #[error("An entry named '{0}' already exists")]
    DuplicateName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Stale or foreign handle")]
    InvalidHandle,

    #[error("Range {offset}+{len} exceeds resource size {size}")]
    OutOfRange { offset: u32, len: usize, size: u32 },

    #[error("Bin {bin} out of range for table with {num_bins} bins")]
    BinOutOfRange { bin: usize, num_bins: usize },

    #[error("Resource has no payload buffer")]
    NotLoaded,

    #[error("Emulated directories cannot be opened for writing")]
    EmulatedDirWrite,

    #[error("Overlays can only be added to an archive opened read-only")]
    OverlayOnWritable,

    #[error("Invalid name '{0}'")]
    InvalidName(String),

    #[error("Unknown record tag {0} in directory block")]
    BadRecordTag(u32),

    #[error("Archive offsets would exceed 4 GiB")]
    ArchiveFull,
}

pub type Result<T> = std::result::Result<T, RezError>;
