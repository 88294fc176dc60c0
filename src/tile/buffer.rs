//! Decoded RGBA pixel buffers.

use std::fmt;

use image::RgbaImage;

/// Channels per pixel in every decoded buffer.
pub const CHANNELS: usize = 4;

/// Fill value for pixels outside the level: transparent black.
pub const BACKGROUND_PIXEL: [u8; CHANNELS] = [0, 0, 0, 0];

/// Decoded pixels for a tile, region or associated image.
///
/// Always 8-bit RGBA, row-major, with no row padding, so the byte length is
/// exactly `width * height * 4`.
#[derive(Clone, PartialEq, Eq)]
pub struct TileBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TileBuffer {
    /// Byte length of a `width` x `height` buffer, `None` on overflow.
    pub fn byte_len_for(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(CHANNELS)
    }

    /// A buffer filled with [`BACKGROUND_PIXEL`].
    ///
    /// Returns `None` when the size overflows or the allocation is refused.
    pub fn background(width: u32, height: u32) -> Option<Self> {
        let len = Self::byte_len_for(width, height)?;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).ok()?;
        pixels.resize(len, 0);
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Wrap RGBA bytes, `None` if the length does not match the dimensions.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if Self::byte_len_for(width, height)? != pixels.len() {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The raw RGBA bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// RGBA value at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; CHANNELS]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let mut out = [0u8; CHANNELS];
        out.copy_from_slice(&self.pixels[start..start + CHANNELS]);
        Some(out)
    }

    /// Copy a `width` x `height` block from `src` at `(src_x, src_y)` into
    /// this buffer at `(dst_x, dst_y)`.
    ///
    /// Callers keep both rectangles inside their buffers.
    pub(crate) fn copy_rect(
        &mut self,
        src: &TileBuffer,
        (src_x, src_y): (u32, u32),
        (dst_x, dst_y): (u32, u32),
        (width, height): (u32, u32),
    ) {
        let row_bytes = width as usize * CHANNELS;
        let src_stride = src.width as usize * CHANNELS;
        let dst_stride = self.width as usize * CHANNELS;

        for row in 0..height as usize {
            let s = (src_y as usize + row) * src_stride + src_x as usize * CHANNELS;
            let d = (dst_y as usize + row) * dst_stride + dst_x as usize * CHANNELS;
            self.pixels[d..d + row_bytes].copy_from_slice(&src.pixels[s..s + row_bytes]);
        }
    }

    /// Convert into an `image` buffer for encoding.
    pub fn into_image(self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels)
    }
}

impl fmt::Debug for TileBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}
