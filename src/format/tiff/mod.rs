//! TIFF and BigTIFF container parsing.
//!
//! # Key Concepts
//!
//! - **Byte order**: declared in the header (II = little-endian, MM =
//!   big-endian); every multi-byte value respects it.
//!
//! - **Classic TIFF vs BigTIFF**: 32-bit vs 64-bit offsets, handled
//!   transparently.
//!
//! - **IFD chain**: each directory describes one image (pyramid level,
//!   thumbnail, label, macro) and links to the next. The chain is walked
//!   once at open with loop and length limits.
//!
//! - **Chunks**: pixels are stored as tiles or strips. [`TiffImage`] treats
//!   both as a grid of chunks.

mod directory;
mod parser;
mod pyramid;
mod tags;
mod validation;
mod values;

pub use directory::{read_ascii_tag, read_float_tag, TiffImage};
pub use parser::{
    read_ifd, read_ifd_chain, ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE,
    MAX_IFDS, TIFF_HEADER_SIZE,
};
pub use pyramid::{compute_downsamples, TiffPyramid};
pub use tags::{Compression, FieldType, Photometric, TiffTag};
pub use validation::{validate_sample_layout, SampleLayout};
pub use values::ValueReader;
