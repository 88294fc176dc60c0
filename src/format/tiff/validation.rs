//! Checks that an image directory describes something the decoder can serve.
//!
//! # Supported subset
//!
//! - **Organization**: tiles or strips
//! - **Compression**: none, LZW, JPEG, Deflate, Adobe Deflate
//! - **Samples**: 8 bits, chunky, 1 (gray), 3 (RGB or YCbCr JPEG) or 4 (RGBA)
//! - **Predictor**: none or horizontal differencing
//!
//! Well-formed files outside the subset fail with `UnsupportedCompression`
//! or `UnsupportedLayout`. Broken chunk indexes fail with structural errors.

use crate::error::TiffError;

use super::tags::{Compression, Photometric};

/// Sample layout tags of one directory, with TIFF defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleLayout {
    pub compression: u16,
    pub photometric: Photometric,
    pub samples_per_pixel: u16,
    pub bits_per_sample: Vec<u64>,
    pub planar_configuration: u16,
    pub predictor: u16,
}

/// Validate a sample layout and resolve its compression scheme.
pub fn validate_sample_layout(layout: &SampleLayout) -> Result<Compression, TiffError> {
    let compression = Compression::from_u16(layout.compression)
        .ok_or_else(|| TiffError::UnsupportedCompression(format!("Unknown ({})", layout.compression)))?;
    if !compression.is_supported() {
        return Err(TiffError::UnsupportedCompression(compression.name().to_string()));
    }

    let spp = layout.samples_per_pixel;
    if !matches!(spp, 1 | 3 | 4) {
        return Err(TiffError::UnsupportedLayout(format!("{spp} samples per pixel")));
    }

    if layout.bits_per_sample.iter().any(|&bits| bits != 8) {
        return Err(TiffError::UnsupportedLayout(format!(
            "bits per sample {:?}",
            layout.bits_per_sample
        )));
    }

    if spp > 1 && layout.planar_configuration != 1 {
        return Err(TiffError::UnsupportedLayout(format!(
            "planar configuration {}",
            layout.planar_configuration
        )));
    }

    if !matches!(layout.predictor, 1 | 2) {
        return Err(TiffError::UnsupportedLayout(format!("predictor {}", layout.predictor)));
    }

    let photometric_ok = match (compression, spp, layout.photometric) {
        (Compression::Jpeg, 1, Photometric::MinIsBlack) => true,
        (Compression::Jpeg, 3, Photometric::YCbCr | Photometric::Rgb) => true,
        (Compression::Jpeg, _, _) => false,
        (_, 1, Photometric::MinIsBlack | Photometric::MinIsWhite) => true,
        (_, 3 | 4, Photometric::Rgb) => true,
        _ => false,
    };
    if !photometric_ok {
        return Err(TiffError::UnsupportedLayout(format!(
            "{:?} with {} samples and {} compression",
            layout.photometric,
            spp,
            compression.name()
        )));
    }

    Ok(compression)
}

/// Validate tile or strip dimensions, returning non-fatal warnings.
pub fn validate_chunk_dimensions(
    chunk_width: u32,
    chunk_height: u32,
    tiled: bool,
) -> Result<Vec<String>, TiffError> {
    let tag = if tiled { "TileWidth/TileLength" } else { "RowsPerStrip" };
    if chunk_width == 0 || chunk_height == 0 {
        return Err(TiffError::InvalidTagValue {
            tag,
            message: format!("chunk size {chunk_width}x{chunk_height}"),
        });
    }

    let mut warnings = Vec::new();
    if tiled && (chunk_width % 16 != 0 || chunk_height % 16 != 0) {
        warnings.push(format!(
            "tile size {chunk_width}x{chunk_height} is not a multiple of 16"
        ));
    }
    Ok(warnings)
}

/// Validate a chunk index: one offset and one byte count per chunk, every
/// chunk inside the file.
pub fn validate_chunk_index(
    offsets: &[u64],
    byte_counts: &[u64],
    expected: u64,
    file_size: u64,
    offsets_tag: &'static str,
) -> Result<(), TiffError> {
    if offsets.len() as u64 != expected {
        return Err(TiffError::InvalidTagValue {
            tag: offsets_tag,
            message: format!("expected {expected} entries, found {}", offsets.len()),
        });
    }
    if byte_counts.len() != offsets.len() {
        return Err(TiffError::InvalidTagValue {
            tag: offsets_tag,
            message: format!(
                "{} offsets but {} byte counts",
                offsets.len(),
                byte_counts.len()
            ),
        });
    }

    for (index, (&offset, &length)) in offsets.iter().zip(byte_counts).enumerate() {
        // Zero-length chunks are sparse and read as background
        if length == 0 {
            continue;
        }
        if offset.checked_add(length).map_or(true, |end| end > file_size) {
            return Err(TiffError::ChunkOutOfBounds {
                index,
                offset,
                length,
                size: file_size,
            });
        }
    }
    Ok(())
}
