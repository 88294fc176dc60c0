//! TIFF plumbing shared by the SVS and generic TIFF backends.
//!
//! [`TiffContainer`] is the parse-time view: header, IFD chain and helpers
//! that attach `IFD n` context to TIFF errors. [`TiffSlide`] is what a
//! backend keeps after parsing: the reader, the pyramid levels and the
//! associated images.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ChunkError, SlideError, TiffError};
use crate::io::RangeReader;
use crate::slide::properties::{
    level_property, PROPERTY_COMMENT, PROPERTY_LEVEL_COUNT, PROPERTY_QUICKHASH, PROPERTY_VENDOR,
};
use crate::slide::{LevelInfo, ParsedSlide, PropertyTable};
use crate::tile::{TileBuffer, TileCoord, TileGrid};

use super::tiff::{
    read_ascii_tag, read_float_tag, read_ifd_chain, Ifd, TiffHeader, TiffImage, TiffPyramid,
    TiffTag, ValueReader,
};
use super::SlideFormat;

/// The lowest level is hashed only when its compressed data is this small.
const QUICKHASH_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// ASCII tags of IFD 0 exposed as `tiff.*` properties.
const ASCII_PROPERTY_TAGS: &[TiffTag] = &[
    TiffTag::ImageDescription,
    TiffTag::Make,
    TiffTag::Model,
    TiffTag::Software,
    TiffTag::DateTime,
    TiffTag::Artist,
    TiffTag::HostComputer,
    TiffTag::Copyright,
    TiffTag::DocumentName,
];

// =============================================================================
// TiffContainer
// =============================================================================

/// A TIFF file whose directory chain has been read but not interpreted.
pub(crate) struct TiffContainer {
    reader: Box<dyn RangeReader>,
    header: TiffHeader,
    ifds: Vec<Ifd>,
}

impl TiffContainer {
    pub fn open(reader: Box<dyn RangeReader>) -> Result<Self, SlideError> {
        let path = reader.identifier().to_string();
        let header = TiffHeader::read(reader.as_ref())
            .map_err(|err| SlideError::from_tiff(&path, "header", err))?;
        let ifds = read_ifd_chain(reader.as_ref(), &header)
            .map_err(|err| SlideError::from_tiff(&path, "IFD chain", err))?;
        if ifds.is_empty() {
            return Err(SlideError::CorruptContainer {
                path,
                substructure: "IFD chain".to_string(),
                message: "no image directories".to_string(),
            });
        }

        debug!(
            path = %path,
            bigtiff = header.is_bigtiff,
            byte_order = ?header.byte_order,
            ifds = ifds.len(),
            "Opened TIFF container"
        );
        Ok(Self {
            reader,
            header,
            ifds,
        })
    }

    pub fn path(&self) -> &str {
        self.reader.identifier()
    }

    pub fn ifds(&self) -> &[Ifd] {
        &self.ifds
    }

    /// Convert a TIFF error found in directory `index`.
    pub fn error(&self, index: usize, err: TiffError) -> SlideError {
        let substructure = match err.tag() {
            Some(tag) => format!("IFD {index} {tag}"),
            None => format!("IFD {index}"),
        };
        SlideError::from_tiff(self.path(), substructure, err)
    }

    /// Parse and validate directory `index` as a decodable image.
    pub fn load_image(&self, index: usize) -> Result<TiffImage, SlideError> {
        TiffImage::load(self.reader.as_ref(), &self.header, &self.ifds[index], index)
            .map_err(|err| self.error(index, err))
    }

    pub fn ascii_tag(&self, index: usize, tag: TiffTag) -> Result<Option<String>, SlideError> {
        read_ascii_tag(self.reader.as_ref(), &self.header, &self.ifds[index], tag)
            .map_err(|err| self.error(index, err))
    }

    pub fn float_tag(&self, index: usize, tag: TiffTag) -> Result<Option<f64>, SlideError> {
        read_float_tag(self.reader.as_ref(), &self.header, &self.ifds[index], tag)
            .map_err(|err| self.error(index, err))
    }

    pub fn integer_tag(&self, index: usize, tag: TiffTag) -> Result<Option<u64>, SlideError> {
        let values = ValueReader::new(self.reader.as_ref(), &self.header);
        self.ifds[index]
            .get_entry_by_tag(tag)
            .map(|entry| values.read_u64(entry))
            .transpose()
            .map_err(|err| self.error(index, err))
    }

    /// Order level candidates into a pyramid.
    pub fn build_pyramid(&self, images: Vec<TiffImage>) -> Result<TiffPyramid, SlideError> {
        TiffPyramid::build(images).map_err(|err| SlideError::from_tiff(self.path(), "pyramid", err))
    }

    /// `tiff.*` properties and the comment, taken from IFD 0.
    pub fn tiff_properties(&self, properties: &mut PropertyTable) -> Result<(), SlideError> {
        for &tag in ASCII_PROPERTY_TAGS {
            if let Some(value) = self.ascii_tag(0, tag)? {
                properties.insert(format!("tiff.{}", tag.name()), value);
            }
        }
        if let Some(description) = properties.get("tiff.ImageDescription").map(str::to_string) {
            properties.insert(PROPERTY_COMMENT, description);
        }

        for tag in [TiffTag::XResolution, TiffTag::YResolution] {
            if let Some(value) = self.float_tag(0, tag)? {
                properties.insert(format!("tiff.{}", tag.name()), value.to_string());
            }
        }
        if let Some(unit) = self.integer_tag(0, TiffTag::ResolutionUnit)? {
            properties.insert("tiff.ResolutionUnit", resolution_unit_name(unit));
        }
        Ok(())
    }

    /// Finish parsing: add the computed properties and hand the reader to a
    /// [`TiffSlide`].
    pub fn finish(
        self,
        format: SlideFormat,
        pyramid: TiffPyramid,
        associated: Vec<(String, TiffImage)>,
        mut properties: PropertyTable,
    ) -> Result<ParsedSlide<TiffSlide>, SlideError> {
        let levels: Vec<LevelInfo> = pyramid
            .levels
            .iter()
            .zip(&pyramid.downsamples)
            .enumerate()
            .map(|(index, (image, &downsample))| LevelInfo {
                index,
                width: image.width,
                height: image.height,
                downsample,
            })
            .collect();

        properties.insert(PROPERTY_VENDOR, format.vendor());
        properties.insert(PROPERTY_LEVEL_COUNT, levels.len().to_string());
        for (level, image) in levels.iter().zip(&pyramid.levels) {
            let i = level.index;
            properties.insert(level_property(i, "width"), level.width.to_string());
            properties.insert(level_property(i, "height"), level.height.to_string());
            properties.insert(level_property(i, "downsample"), level.downsample.to_string());
            properties.insert(level_property(i, "tile-width"), image.grid.tile_width.to_string());
            properties.insert(level_property(i, "tile-height"), image.grid.tile_height.to_string());
        }

        if let Some(hash) = self.quickhash(&pyramid, &properties)? {
            properties.insert(PROPERTY_QUICKHASH, hash);
        }

        let TiffPyramid {
            levels: level_images,
            degenerate,
            ..
        } = pyramid;
        Ok(ParsedSlide {
            adapter: TiffSlide {
                reader: self.reader,
                format,
                levels: level_images,
                associated,
            },
            levels,
            properties,
            degenerate,
        })
    }

    /// SHA-256 over the `tiff.*` properties and the compressed data of the
    /// lowest level.
    fn quickhash(
        &self,
        pyramid: &TiffPyramid,
        properties: &PropertyTable,
    ) -> Result<Option<String>, SlideError> {
        let Some(lowest) = pyramid.levels.last() else {
            return Ok(None);
        };
        let size = lowest.compressed_size();
        if size > QUICKHASH_MAX_BYTES {
            debug!(
                path = self.path(),
                size, "Lowest level too large, skipping quickhash"
            );
            return Ok(None);
        }

        let mut hasher = Sha256::new();
        for (key, value) in properties.iter().filter(|(key, _)| key.starts_with("tiff.")) {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(lowest.read_all_chunks(self.reader.as_ref())?);
        Ok(Some(hex::encode(hasher.finalize())))
    }
}

fn resolution_unit_name(unit: u64) -> String {
    match unit {
        1 => "none".to_string(),
        2 => "inch".to_string(),
        3 => "centimeter".to_string(),
        other => other.to_string(),
    }
}

// =============================================================================
// TiffSlide
// =============================================================================

/// Parsed state of a TIFF-based slide.
pub(crate) struct TiffSlide {
    reader: Box<dyn RangeReader>,
    format: SlideFormat,
    levels: Vec<TiffImage>,
    associated: Vec<(String, TiffImage)>,
}

impl TiffSlide {
    pub fn format(&self) -> SlideFormat {
        self.format
    }

    pub fn tile_grid(&self, level: usize) -> Option<TileGrid> {
        self.levels.get(level).map(|image| image.grid)
    }

    pub fn decode_tile(&self, level: usize, coord: TileCoord) -> Result<TileBuffer, SlideError> {
        let image = self.levels.get(level).ok_or(SlideError::IndexOutOfRange {
            level,
            count: self.levels.len(),
        })?;
        image
            .decode_chunk(self.reader.as_ref(), coord)
            .map_err(|err| match err {
                ChunkError::OutOfRange => SlideError::TileOutOfRange {
                    level,
                    col: coord.col,
                    row: coord.row,
                    cols: image.grid.cols,
                    rows: image.grid.rows,
                },
                ChunkError::Io(err) => SlideError::Io(err),
                ChunkError::Codec(source) => SlideError::Decode {
                    level,
                    col: coord.col,
                    row: coord.row,
                    source,
                },
            })
    }

    pub fn associated_image_names(&self) -> Vec<String> {
        self.associated.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn read_associated_image(&self, name: &str) -> Result<TileBuffer, SlideError> {
        let (_, image) = self
            .associated
            .iter()
            .find(|(candidate, _)| candidate == name)
            .ok_or_else(|| SlideError::AssociatedImageNotFound(name.to_string()))?;

        let path = self.reader.identifier();
        image.decode_all(self.reader.as_ref(), |coord, err| match err {
            ChunkError::Io(err) => SlideError::Io(err),
            ChunkError::Codec(source) => SlideError::AssociatedDecode {
                name: name.to_string(),
                col: coord.col,
                row: coord.row,
                source,
            },
            ChunkError::OutOfRange => SlideError::CorruptContainer {
                path: path.to_string(),
                substructure: format!("associated image {name}"),
                message: format!("chunk ({}, {}) outside the chunk grid", coord.col, coord.row),
            },
        })
    }

    pub fn close(&mut self) {
        self.reader.close();
    }
}
