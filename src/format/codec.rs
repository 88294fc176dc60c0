//! Tile and strip decoding.
//!
//! Turns the compressed bytes of one TIFF chunk into an RGBA [`TileBuffer`]
//! clipped to the part of the chunk that lies inside the image. Edge tiles
//! are stored padded to the full tile size, so the stored geometry and the
//! kept geometry differ.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::ZlibDecoder;
use image::ImageFormat;

use crate::error::CodecError;
use crate::tile::{TileBuffer, CHANNELS};

use super::jpeg::merge_tables;
use super::tiff::{Compression, Photometric};

/// How the samples of a chunk are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEncoding {
    pub compression: Compression,
    pub photometric: Photometric,
    pub samples_per_pixel: u16,
    /// 1 = none, 2 = horizontal differencing
    pub predictor: u16,
}

/// Stored size of a chunk and the top-left part of it to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkGeometry {
    pub stored_width: u32,
    pub stored_height: u32,
    pub width: u32,
    pub height: u32,
}

/// Decode one chunk into RGBA.
pub fn decode_chunk(
    data: &[u8],
    jpeg_tables: Option<&[u8]>,
    encoding: &ChunkEncoding,
    geometry: ChunkGeometry,
) -> Result<TileBuffer, CodecError> {
    match encoding.compression {
        Compression::Jpeg => decode_jpeg(data, jpeg_tables, geometry),
        Compression::None => samples_to_rgba(Cow::Borrowed(data), encoding, geometry),
        Compression::Lzw => {
            let limit = stored_len(encoding, geometry)?;
            samples_to_rgba(Cow::Owned(inflate_lzw(data, limit)?), encoding, geometry)
        }
        Compression::Deflate | Compression::AdobeDeflate => {
            let limit = stored_len(encoding, geometry)?;
            samples_to_rgba(Cow::Owned(inflate_zlib(data, limit)?), encoding, geometry)
        }
        other => Err(CodecError::Unsupported(other.name().to_string())),
    }
}

/// Byte length of a fully stored chunk; decompressed output never needs more.
fn stored_len(encoding: &ChunkEncoding, geometry: ChunkGeometry) -> Result<usize, CodecError> {
    (geometry.stored_width as usize)
        .checked_mul(encoding.samples_per_pixel as usize)
        .and_then(|stride| stride.checked_mul(geometry.stored_height as usize))
        .ok_or_else(|| {
            CodecError::Unsupported(format!(
                "{}x{} chunk is too large",
                geometry.stored_width, geometry.stored_height
            ))
        })
}

/// Decode at most `limit` bytes of a TIFF LZW stream.
fn inflate_lzw(data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut decoder = weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
    let mut out = vec![0u8; limit];
    let mut input = data;
    let mut filled = 0;

    while filled < limit {
        let result = decoder.decode_bytes(input, &mut out[filled..]);
        input = &input[result.consumed_in..];
        filled += result.consumed_out;
        match result.status.map_err(|e| CodecError::Lzw(e.to_string()))? {
            weezl::LzwStatus::Done | weezl::LzwStatus::NoProgress => break,
            weezl::LzwStatus::Ok => {}
        }
    }

    out.truncate(filled);
    Ok(out)
}

/// Inflate at most `limit` bytes of a zlib stream.
fn inflate_zlib(data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(limit);
    ZlibDecoder::new(data)
        .take(limit as u64)
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Deflate(e.to_string()))?;
    Ok(out)
}

fn decode_jpeg(
    data: &[u8],
    jpeg_tables: Option<&[u8]>,
    geometry: ChunkGeometry,
) -> Result<TileBuffer, CodecError> {
    let stream = match jpeg_tables {
        Some(tables) => Cow::Owned(merge_tables(tables, data).to_vec()),
        None => Cow::Borrowed(data),
    };

    let decoded = image::load_from_memory_with_format(&stream, ImageFormat::Jpeg)
        .map_err(|e| CodecError::Jpeg(e.to_string()))?
        .to_rgba8();

    let (actual_width, actual_height) = decoded.dimensions();
    if actual_width < geometry.width || actual_height < geometry.height {
        return Err(CodecError::DimensionMismatch {
            width: geometry.width,
            height: geometry.height,
            actual_width,
            actual_height,
        });
    }

    let full = TileBuffer::from_rgba(actual_width, actual_height, decoded.into_raw()).ok_or(
        CodecError::Truncated {
            expected: TileBuffer::byte_len_for(actual_width, actual_height).unwrap_or(usize::MAX),
            actual: 0,
        },
    )?;
    if (actual_width, actual_height) == (geometry.width, geometry.height) {
        return Ok(full);
    }
    crop(&full, geometry.width, geometry.height)
}

fn crop(full: &TileBuffer, width: u32, height: u32) -> Result<TileBuffer, CodecError> {
    let mut out = TileBuffer::background(width, height).ok_or(CodecError::Truncated {
        expected: TileBuffer::byte_len_for(width, height).unwrap_or(usize::MAX),
        actual: 0,
    })?;
    out.copy_rect(full, (0, 0), (0, 0), (width, height));
    Ok(out)
}

/// Convert uncompressed 8-bit chunky samples to RGBA.
fn samples_to_rgba(
    raw: Cow<'_, [u8]>,
    encoding: &ChunkEncoding,
    geometry: ChunkGeometry,
) -> Result<TileBuffer, CodecError> {
    let spp = encoding.samples_per_pixel as usize;
    let stride = geometry.stored_width as usize * spp;
    let expected = stride * geometry.height as usize;
    if stride == 0 {
        return Err(CodecError::Unsupported("zero-width chunk".to_string()));
    }
    if raw.len() < expected {
        return Err(CodecError::Truncated {
            expected,
            actual: raw.len(),
        });
    }

    let samples = if encoding.predictor == 2 {
        let mut owned = raw.into_owned();
        undo_horizontal_differencing(&mut owned[..expected], stride, spp);
        Cow::Owned(owned)
    } else {
        raw
    };

    let to_rgba: fn(&[u8]) -> [u8; CHANNELS] = match (spp, encoding.photometric) {
        (1, Photometric::MinIsBlack) => |s: &[u8]| [s[0], s[0], s[0], 255],
        (1, Photometric::MinIsWhite) => |s: &[u8]| {
            let v = 255 - s[0];
            [v, v, v, 255]
        },
        (3, Photometric::Rgb) => |s: &[u8]| [s[0], s[1], s[2], 255],
        (4, Photometric::Rgb) => |s: &[u8]| [s[0], s[1], s[2], s[3]],
        (spp, photometric) => {
            return Err(CodecError::Unsupported(format!(
                "{spp} samples per pixel with {photometric:?}"
            )))
        }
    };

    let width = geometry.width as usize;
    let mut pixels = Vec::with_capacity(width * geometry.height as usize * CHANNELS);
    for row in samples[..expected].chunks_exact(stride) {
        for sample in row[..width * spp].chunks_exact(spp) {
            pixels.extend_from_slice(&to_rgba(sample));
        }
    }

    TileBuffer::from_rgba(geometry.width, geometry.height, pixels).ok_or(CodecError::Truncated {
        expected,
        actual: samples.len(),
    })
}

/// Reverse TIFF predictor 2 on 8-bit samples: each sample was stored as the
/// difference from the same channel of the previous pixel.
fn undo_horizontal_differencing(data: &mut [u8], stride: usize, spp: usize) {
    for row in data.chunks_exact_mut(stride) {
        for i in spp..row.len() {
            row[i] = row[i].wrapping_add(row[i - spp]);
        }
    }
}
