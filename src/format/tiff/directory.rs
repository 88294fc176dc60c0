//! One decodable image of a TIFF file: geometry, encoding and chunk index.
//!
//! Tiled and stripped directories share one model. A strip is a chunk as
//! wide as the image and `RowsPerStrip` tall, so the same grid, chunk
//! lookup and compositing code serves both.

use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;

use crate::error::{ChunkError, IoError, SlideError, TiffError};
use crate::format::codec::{decode_chunk, ChunkEncoding, ChunkGeometry};
use crate::io::RangeReader;
use crate::tile::{compose_region, Region, TileBuffer, TileCoord, TileGrid};

use super::parser::{Ifd, TiffHeader};
use super::tags::{Compression, Photometric, TiffTag};
use super::validation::{
    validate_chunk_dimensions, validate_chunk_index, validate_sample_layout, SampleLayout,
};
use super::values::ValueReader;

/// A parsed, validated image directory ready for chunk decoding.
#[derive(Debug, Clone)]
pub struct TiffImage {
    /// Position of the directory in the IFD chain
    pub ifd_index: usize,
    pub width: u32,
    pub height: u32,
    pub tiled: bool,
    /// Chunk grid; for strips the chunk width is the image width
    pub grid: TileGrid,
    pub encoding: ChunkEncoding,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
    jpeg_tables: Option<Bytes>,
}

impl TiffImage {
    /// Parse and validate an image directory.
    ///
    /// Non-fatal findings are logged; anything that would make a chunk
    /// undecodable or point outside the file is an error.
    pub fn load<R: RangeReader + ?Sized>(
        reader: &R,
        header: &TiffHeader,
        ifd: &Ifd,
        ifd_index: usize,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let width = required_u32(&values, ifd, TiffTag::ImageWidth)?;
        let height = required_u32(&values, ifd, TiffTag::ImageLength)?;
        if width == 0 || height == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: "ImageWidth/ImageLength",
                message: format!("empty image {width}x{height}"),
            });
        }

        let tiled = ifd.is_tiled();
        let (chunk_width, chunk_height, offsets_tag, counts_tag) = if tiled {
            (
                required_u32(&values, ifd, TiffTag::TileWidth)?,
                required_u32(&values, ifd, TiffTag::TileLength)?,
                TiffTag::TileOffsets,
                TiffTag::TileByteCounts,
            )
        } else if ifd.is_stripped() {
            let rows_per_strip = optional_u32(&values, ifd, TiffTag::RowsPerStrip)?
                .unwrap_or(height)
                .min(height);
            (width, rows_per_strip, TiffTag::StripOffsets, TiffTag::StripByteCounts)
        } else {
            return Err(TiffError::MissingTag("TileOffsets"));
        };

        for warning in validate_chunk_dimensions(chunk_width, chunk_height, tiled)? {
            warn!(ifd = ifd_index, "{}", warning);
        }

        let layout = read_sample_layout(&values, ifd)?;
        let compression = validate_sample_layout(&layout)?;
        let encoding = ChunkEncoding {
            compression,
            photometric: layout.photometric,
            samples_per_pixel: layout.samples_per_pixel,
            predictor: layout.predictor,
        };

        let grid = TileGrid::new(width, height, chunk_width, chunk_height);
        let offsets = match ifd.get_entry_by_tag(offsets_tag) {
            Some(entry) => values.read_u64_array(entry)?,
            None => return Err(TiffError::MissingTag(offsets_tag.name())),
        };
        let byte_counts = match ifd.get_entry_by_tag(counts_tag) {
            Some(entry) => values.read_u64_array(entry)?,
            None => return Err(TiffError::MissingTag(counts_tag.name())),
        };
        validate_chunk_index(
            &offsets,
            &byte_counts,
            grid.tile_count(),
            reader.size(),
            offsets_tag.name(),
        )?;

        let jpeg_tables = match (compression, ifd.get_entry_by_tag(TiffTag::JpegTables)) {
            (Compression::Jpeg, Some(entry)) => Some(values.read_bytes(entry)?),
            (_, Some(_)) => {
                warn!(ifd = ifd_index, "JPEGTables present on a non-JPEG image, ignoring");
                None
            }
            (_, None) => None,
        };

        Ok(TiffImage {
            ifd_index,
            width,
            height,
            tiled,
            grid,
            encoding,
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn jpeg_tables(&self) -> Option<&[u8]> {
        self.jpeg_tables.as_deref()
    }

    /// Offset and byte count of a chunk.
    pub fn chunk_location(&self, coord: TileCoord) -> Option<(u64, u64)> {
        let index = self.grid.index(coord)?;
        Some((self.offsets[index], self.byte_counts[index]))
    }

    /// Sum of all chunk byte counts.
    pub fn compressed_size(&self) -> u64 {
        self.byte_counts.iter().sum()
    }

    /// Compressed bytes of one chunk, `None` for a sparse chunk.
    pub fn read_chunk<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
        coord: TileCoord,
    ) -> Result<Option<Bytes>, ChunkError> {
        let (offset, length) = self.chunk_location(coord).ok_or(ChunkError::OutOfRange)?;
        if length == 0 {
            return Ok(None);
        }
        let length = usize::try_from(length).map_err(|_| IoError::RangeOutOfBounds {
            path: reader.identifier().to_string(),
            offset,
            requested: length,
            size: reader.size(),
        })?;
        Ok(Some(reader.read_exact_at(offset, length)?))
    }

    /// Concatenated compressed bytes of every chunk, in index order.
    pub fn read_all_chunks<R: RangeReader + ?Sized>(&self, reader: &R) -> Result<Vec<u8>, IoError> {
        let mut out = Vec::new();
        for (&offset, &length) in self.offsets.iter().zip(&self.byte_counts) {
            if length > 0 {
                out.extend_from_slice(&reader.read_exact_at(offset, length as usize)?);
            }
        }
        Ok(out)
    }

    /// Decode one chunk, clipped to the image edge.
    ///
    /// Sparse chunks decode to background.
    pub fn decode_chunk<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
        coord: TileCoord,
    ) -> Result<TileBuffer, ChunkError> {
        let (width, height) = self.grid.clipped_size(coord);
        let Some(data) = self.read_chunk(reader, coord)? else {
            return TileBuffer::background(width, height).ok_or(ChunkError::OutOfRange);
        };

        let geometry = ChunkGeometry {
            stored_width: self.grid.tile_width,
            stored_height: self.grid.tile_height,
            width,
            height,
        };
        Ok(decode_chunk(&data, self.jpeg_tables(), &self.encoding, geometry)?)
    }

    /// Decode the whole image into one buffer.
    ///
    /// `on_error` attaches context to chunk failures.
    pub fn decode_all<R, F>(&self, reader: &R, on_error: F) -> Result<TileBuffer, SlideError>
    where
        R: RangeReader + ?Sized,
        F: Fn(TileCoord, ChunkError) -> SlideError,
    {
        let region = Region::full_level(0, self.dimensions());
        compose_region(&region, &self.grid, None, |coord| {
            self.decode_chunk(reader, coord)
                .map(Arc::new)
                .map_err(|err| on_error(coord, err))
        })
    }
}

fn required_u32<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<u32, TiffError> {
    optional_u32(values, ifd, tag)?.ok_or(TiffError::MissingTag(tag.name()))
}

fn optional_u32<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<Option<u32>, TiffError> {
    ifd.get_entry_by_tag(tag)
        .map(|entry| values.read_u32(entry))
        .transpose()
}

fn read_sample_layout<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
) -> Result<SampleLayout, TiffError> {
    let samples_per_pixel = optional_u32(values, ifd, TiffTag::SamplesPerPixel)?.unwrap_or(1);
    let samples_per_pixel = u16::try_from(samples_per_pixel).map_err(|_| TiffError::InvalidTagValue {
        tag: "SamplesPerPixel",
        message: samples_per_pixel.to_string(),
    })?;
    let compression = optional_u32(values, ifd, TiffTag::Compression)?.unwrap_or(1);

    let photometric = match optional_u32(values, ifd, TiffTag::PhotometricInterpretation)? {
        Some(value) => Photometric::from_u16(value as u16),
        None if samples_per_pixel >= 3 && compression == Compression::Jpeg as u32 => {
            Photometric::YCbCr
        }
        None if samples_per_pixel >= 3 => Photometric::Rgb,
        None => Photometric::MinIsBlack,
    };

    // TIFF default is one bit per sample
    let bits_per_sample = match ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
        Some(entry) => values.read_u64_array(entry)?,
        None => vec![1],
    };

    Ok(SampleLayout {
        compression: compression as u16,
        photometric,
        samples_per_pixel,
        bits_per_sample,
        planar_configuration: optional_u32(values, ifd, TiffTag::PlanarConfiguration)?
            .unwrap_or(1) as u16,
        predictor: optional_u32(values, ifd, TiffTag::Predictor)?.unwrap_or(1) as u16,
    })
}

/// Read an ASCII tag, `None` when the tag is absent.
pub fn read_ascii_tag<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<Option<String>, TiffError> {
    ifd.get_entry_by_tag(tag)
        .map(|entry| ValueReader::new(reader, header).read_string(entry))
        .transpose()
}

/// Read a numeric tag as a float (RATIONAL or integer), `None` when absent.
pub fn read_float_tag<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<Option<f64>, TiffError> {
    ifd.get_entry_by_tag(tag)
        .map(|entry| ValueReader::new(reader, header).read_rational(entry))
        .transpose()
}
