//! Pyramid level ordering and downsample computation.
//!
//! Levels are sorted by width, largest first. Downsamples are measured
//! against level 0 along the axis where level 0 is longest, which keeps
//! integer truncation of the smaller levels out of the ratio: a 2000x1000
//! base with a 125x62 level gives exactly 16.0 rather than 16.06.

use tracing::{debug, warn};

use crate::error::TiffError;

use super::directory::TiffImage;

/// Pyramid levels of a TIFF file, sorted from full resolution down.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub levels: Vec<TiffImage>,
    pub downsamples: Vec<f64>,
    /// Levels whose size does not shrink relative to the previous level
    pub degenerate: Vec<usize>,
}

impl TiffPyramid {
    /// Order candidate images into a pyramid.
    pub fn build(mut images: Vec<TiffImage>) -> Result<Self, TiffError> {
        if images.is_empty() {
            return Err(TiffError::MissingTag("TileOffsets"));
        }

        // Stable, so equal sizes keep directory order
        images.sort_by(|a, b| b.width.cmp(&a.width).then(b.height.cmp(&a.height)));

        let dims: Vec<(u32, u32)> = images.iter().map(TiffImage::dimensions).collect();
        let (downsamples, degenerate) = compute_downsamples(&dims)?;

        for (index, image) in images.iter().enumerate() {
            debug!(
                level = index,
                ifd = image.ifd_index,
                width = image.width,
                height = image.height,
                downsample = downsamples[index],
                "Pyramid level"
            );
        }

        Ok(TiffPyramid {
            levels: images,
            downsamples,
            degenerate,
        })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> Option<&TiffImage> {
        self.levels.get(index)
    }
}

/// Downsample factors for levels sorted by width descending.
///
/// Returns the factors and the indexes of degenerate levels. A level that
/// is taller than the one before it is rejected.
pub fn compute_downsamples(dims: &[(u32, u32)]) -> Result<(Vec<f64>, Vec<usize>), TiffError> {
    let Some(&(base_width, base_height)) = dims.first() else {
        return Ok((Vec::new(), Vec::new()));
    };
    let use_width = base_width >= base_height;

    let mut downsamples = Vec::with_capacity(dims.len());
    let mut degenerate = Vec::new();

    for (index, &(width, height)) in dims.iter().enumerate() {
        let downsample = if use_width {
            base_width as f64 / width as f64
        } else {
            base_height as f64 / height as f64
        };

        if index > 0 {
            let (prev_width, prev_height) = dims[index - 1];
            if width > prev_width || height > prev_height {
                return Err(TiffError::InconsistentPyramid(format!(
                    "level {index} is {width}x{height} after {prev_width}x{prev_height}"
                )));
            }
            if downsample <= downsamples[index - 1] {
                warn!(
                    level = index,
                    width, height, "Degenerate pyramid level does not shrink"
                );
                degenerate.push(index);
            }
        }
        downsamples.push(downsample);
    }

    Ok((downsamples, degenerate))
}
