use std::sync::Arc;

use thiserror::Error;

/// I/O errors that can occur when reading from a slide file
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// The file could not be opened or stat'ed
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A positional read failed
    #[error("Failed to read {len} bytes at offset {offset} from {path}: {source}")]
    Read {
        path: String,
        offset: u64,
        len: usize,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds in {path}: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        path: String,
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// The reader was closed before the read was issued
    #[error("Reader for {0} is closed")]
    Closed(String),
}

impl IoError {
    /// Identifier of the resource the error refers to.
    pub fn path(&self) -> &str {
        match self {
            IoError::Open { path, .. }
            | IoError::Read { path, .. }
            | IoError::RangeOutOfBounds { path, .. }
            | IoError::Closed(path) => path,
        }
    }
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// The IFD chain points back at a directory that was already visited
    #[error("IFD chain loops back to offset {0}")]
    IfdLoop(u64),

    /// The IFD chain is longer than the parser accepts
    #[error("IFD chain exceeds {0} directories")]
    TooManyIfds(usize),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// A tile or strip points outside the file
    #[error("Chunk {index} at offset {offset} with {length} bytes exceeds file size {size}")]
    ChunkOutOfBounds {
        index: usize,
        offset: u64,
        length: u64,
        size: u64,
    },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Pixel layout the decoder cannot convert to RGBA
    #[error("Unsupported sample layout: {0}")]
    UnsupportedLayout(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Levels do not shrink consistently along both axes
    #[error("Inconsistent pyramid: {0}")]
    InconsistentPyramid(String),
}

impl TiffError {
    /// Whether this error describes a broken container structure rather than
    /// a well-formed file using features the decoder does not handle.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            TiffError::UnsupportedCompression(_)
                | TiffError::UnsupportedLayout(_)
                | TiffError::InconsistentPyramid(_)
        )
    }

    /// Name of the tag the error refers to, if any.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            TiffError::MissingTag(tag) | TiffError::InvalidTagValue { tag, .. } => Some(tag),
            _ => None,
        }
    }
}

/// Errors produced while turning compressed tile bytes into RGBA pixels
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// JPEG stream could not be decoded
    #[error("JPEG decode failed: {0}")]
    Jpeg(String),

    /// LZW stream could not be decoded
    #[error("LZW decode failed: {0}")]
    Lzw(String),

    /// Deflate stream could not be decoded
    #[error("Deflate decode failed: {0}")]
    Deflate(String),

    /// Compression or sample layout the codec does not handle
    #[error("Unsupported encoding: {0}")]
    Unsupported(String),

    /// Decompressed data is shorter than the chunk geometry requires
    #[error("Decoded data too short: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Decoded image is smaller than the chunk it should fill
    #[error("Decoded image is {actual_width}x{actual_height}, expected at least {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// Failure reading or decoding one chunk of a TIFF image.
///
/// Carries no level context; backends attach it when converting to
/// [`SlideError`].
#[derive(Debug, Clone, Error)]
pub enum ChunkError {
    /// Coordinate outside the image's chunk grid
    #[error("Chunk coordinate out of range")]
    OutOfRange,

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors returned by the slide API.
///
/// Every variant carries enough context (path, level, coordinate,
/// substructure) to diagnose the failure without re-running.
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// No backend recognizes the file
    #[error("Unsupported format for {path}: {reason}")]
    UnsupportedFormat { path: String, reason: String },

    /// A container substructure is missing, truncated or inconsistent
    #[error("Corrupt container {path}: {substructure}: {message}")]
    CorruptContainer {
        path: String,
        substructure: String,
        message: String,
    },

    /// The container is well formed but describes something the reader cannot serve
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    /// A tile could not be decoded
    #[error("Failed to decode tile ({col}, {row}) of level {level}: {source}")]
    Decode {
        level: usize,
        col: u32,
        row: u32,
        #[source]
        source: CodecError,
    },

    /// A chunk of an associated image could not be decoded
    #[error("Failed to decode chunk ({col}, {row}) of associated image {name}: {source}")]
    AssociatedDecode {
        name: String,
        col: u32,
        row: u32,
        #[source]
        source: CodecError,
    },

    /// Level index is outside the pyramid
    #[error("Level {level} out of range (slide has {count} levels)")]
    IndexOutOfRange { level: usize, count: usize },

    /// Tile coordinate is outside the level's tile grid
    #[error("Tile ({col}, {row}) out of range for level {level} ({cols}x{rows} tiles)")]
    TileOutOfRange {
        level: usize,
        col: u32,
        row: u32,
        cols: u32,
        rows: u32,
    },

    /// Property key is not present
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    /// Associated image name is not present
    #[error("Associated image not found: {0}")]
    AssociatedImageNotFound(String),

    /// The handle was closed
    #[error("Slide handle is closed")]
    ClosedHandle,

    /// Region has no overlap with the level
    #[error("Region {width}x{height} at ({x}, {y}) does not intersect level {level}")]
    EmptyRegion {
        level: usize,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },

    /// Region buffer would not fit in memory
    #[error("Region {width}x{height} is too large to allocate")]
    RegionTooLarge { width: u32, height: u32 },

    /// A cancellation token fired during a read
    #[error("Read cancelled")]
    Cancelled,

    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

impl SlideError {
    /// Convert a TIFF-layer error, naming the substructure that failed.
    ///
    /// I/O errors stay I/O errors. Unsupported compression or sample
    /// layouts become [`SlideError::Parse`]; everything else is a corrupt
    /// container.
    pub fn from_tiff(path: &str, substructure: impl Into<String>, err: TiffError) -> Self {
        match err {
            TiffError::Io(io) => SlideError::Io(io),
            err if err.is_structural() => SlideError::CorruptContainer {
                path: path.to_string(),
                substructure: substructure.into(),
                message: err.to_string(),
            },
            err => SlideError::Parse {
                path: path.to_string(),
                message: format!("{}: {}", substructure.into(), err),
            },
        }
    }

    /// Process exit code used by the command-line tool.
    pub fn exit_code(&self) -> u8 {
        match self {
            SlideError::UnsupportedFormat { .. } => 3,
            SlideError::CorruptContainer { .. } => 4,
            SlideError::Parse { .. } => 5,
            SlideError::Decode { .. } => 6,
            SlideError::AssociatedDecode { .. } => 7,
            SlideError::IndexOutOfRange { .. } => 8,
            SlideError::TileOutOfRange { .. } => 9,
            SlideError::PropertyNotFound(_) => 10,
            SlideError::AssociatedImageNotFound(_) => 11,
            SlideError::ClosedHandle => 12,
            SlideError::EmptyRegion { .. } => 13,
            SlideError::RegionTooLarge { .. } => 14,
            SlideError::Cancelled => 130,
            SlideError::Io(_) => 74,
        }
    }
}
