use bytes::Bytes;

use crate::error::IoError;

/// Trait for reading byte ranges from a slide file.
///
/// This abstraction allows the TIFF parser to read only the bytes it needs
/// (headers, directories, individual tiles) without loading the whole file.
/// Implementations must be safe to call from several threads at once, so
/// reads are positional and never share a cursor.
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds, the reader is closed,
    /// or the underlying read fails.
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Get the total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Get a unique identifier for this resource (for logging and errors).
    ///
    /// For local files this is the path as given to `open`.
    fn identifier(&self) -> &str;

    /// Release the underlying resource. Later reads fail with
    /// [`IoError::Closed`]. Calling this more than once is a no-op.
    fn close(&mut self) {}

    /// Check that `[offset, offset + len)` lies inside the resource.
    fn check_range(&self, offset: u64, len: usize) -> Result<(), IoError> {
        let size = self.size();
        match offset.checked_add(len as u64) {
            Some(end) if end <= size => Ok(()),
            _ => Err(IoError::RangeOutOfBounds {
                path: self.identifier().to_string(),
                offset,
                requested: len as u64,
                size,
            }),
        }
    }
}
