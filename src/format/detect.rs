//! Format detection for whole-slide image files.
//!
//! Detection reads the TIFF header, the first IFD and at most
//! [`MAX_DESCRIPTION_BYTES`] of its ImageDescription. It never fails: a file
//! that cannot be read or classified yields [`Detection::Unrecognized`] with
//! the reason.
//!
//! Rules, first match wins:
//!
//! 1. Not a TIFF/BigTIFF header: unrecognized
//! 2. ImageDescription starts with `Aperio`: Aperio SVS
//! 3. First IFD is tiled: generic tiled TIFF
//! 4. Otherwise: unrecognized

use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::error::{IoError, TiffError};
use crate::io::{FileRangeReader, RangeReader};

use super::tiff::{read_ifd, TiffHeader, TiffTag, ValueReader};
use super::SlideFormat;

/// Maximum bytes of ImageDescription read for detection.
pub const MAX_DESCRIPTION_BYTES: usize = 1024;

/// Marker string for Aperio SVS format.
const APERIO_MARKER: &str = "Aperio";

/// Outcome of format detection.
#[derive(Debug, Clone)]
pub enum Detection {
    Recognized(SlideFormat),
    Unrecognized(UnrecognizedReason),
}

impl Detection {
    pub fn format(&self) -> Option<SlideFormat> {
        match self {
            Detection::Recognized(format) => Some(*format),
            Detection::Unrecognized(_) => None,
        }
    }
}

/// Why a file was not recognized.
#[derive(Debug, Clone)]
pub enum UnrecognizedReason {
    /// The file could not be opened or read
    Io(IoError),

    /// The header is not a TIFF or BigTIFF signature
    NotTiff,

    /// The header is TIFF but the first IFD cannot be read
    UnreadableDirectory(TiffError),

    /// TIFF without a vendor marker whose first image is not tiled
    NoTiledDirectory,
}

impl fmt::Display for UnrecognizedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnrecognizedReason::Io(err) => write!(f, "{err}"),
            UnrecognizedReason::NotTiff => f.write_str("not a TIFF or BigTIFF file"),
            UnrecognizedReason::UnreadableDirectory(err) => {
                write!(f, "first IFD is unreadable: {err}")
            }
            UnrecognizedReason::NoTiledDirectory => {
                f.write_str("TIFF without a vendor marker or tiled first directory")
            }
        }
    }
}

/// Detect the format of the file at `path`.
pub fn detect(path: impl AsRef<Path>) -> Detection {
    match FileRangeReader::open(path.as_ref()) {
        Ok(reader) => detect_reader(&reader),
        Err(err) => Detection::Unrecognized(UnrecognizedReason::Io(err)),
    }
}

/// Vendor name of the file at `path`, `None` when unrecognized.
pub fn detect_vendor(path: impl AsRef<Path>) -> Option<&'static str> {
    detect(path).format().map(|format| format.vendor())
}

/// Detect the format of an already opened resource.
pub fn detect_reader<R: RangeReader + ?Sized>(reader: &R) -> Detection {
    let detection = classify(reader);
    debug!(resource = reader.identifier(), ?detection, "Format detection");
    detection
}

fn classify<R: RangeReader + ?Sized>(reader: &R) -> Detection {
    let header = match TiffHeader::read(reader) {
        Ok(header) => header,
        Err(TiffError::Io(err)) => return Detection::Unrecognized(UnrecognizedReason::Io(err)),
        Err(_) => return Detection::Unrecognized(UnrecognizedReason::NotTiff),
    };

    let ifd = match read_ifd(reader, &header, header.first_ifd_offset) {
        Ok(ifd) => ifd,
        Err(TiffError::Io(err)) => return Detection::Unrecognized(UnrecognizedReason::Io(err)),
        Err(err) => {
            return Detection::Unrecognized(UnrecognizedReason::UnreadableDirectory(err))
        }
    };

    if let Some(entry) = ifd.get_entry_by_tag(TiffTag::ImageDescription) {
        let values = ValueReader::new(reader, &header);
        // An unreadable description only rules out the vendor marker
        if let Ok(description) = values.read_string_prefix(entry, MAX_DESCRIPTION_BYTES) {
            if description.starts_with(APERIO_MARKER) {
                return Detection::Recognized(SlideFormat::AperioSvs);
            }
        }
    }

    if ifd.is_tiled() {
        Detection::Recognized(SlideFormat::GenericTiff)
    } else {
        Detection::Unrecognized(UnrecognizedReason::NoTiledDirectory)
    }
}
