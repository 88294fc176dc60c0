//! Container parsing and pixel decoding for whole-slide images.
//!
//! Both supported formats are TIFF based:
//!
//! - **Aperio SVS**: identified by an `Aperio` prefix in the first
//!   ImageDescription; carries thumbnail, label and macro images
//! - **Generic tiled TIFF**: any TIFF whose first directory is tiled
//!
//! Use [`detect`] to classify a file and the backends in [`svs`] and
//! [`generic_tiff`] to parse it.

pub mod codec;
mod container;
pub mod detect;
pub mod generic_tiff;
pub mod jpeg;
pub mod svs;
pub mod tiff;

use serde::Serialize;

pub use detect::{detect, detect_reader, detect_vendor, Detection, UnrecognizedReason};
pub use generic_tiff::GenericTiffBackend;
pub use svs::SvsBackend;

/// Slide container formats with a backend in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlideFormat {
    /// Aperio SVS (TIFF with JPEGTables and vendor ImageDescription)
    AperioSvs,

    /// Generic tiled TIFF
    GenericTiff,
}

impl SlideFormat {
    /// Human-readable name.
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::GenericTiff => "Generic tiled TIFF",
        }
    }

    /// Vendor string reported as `openslide.vendor`.
    pub const fn vendor(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "aperio",
            SlideFormat::GenericTiff => "generic-tiff",
        }
    }
}

impl std::fmt::Display for SlideFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
