//! Local and in-memory implementations of [`RangeReader`].

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use super::RangeReader;
use crate::error::IoError;

// =============================================================================
// FileRangeReader
// =============================================================================

/// Positional reader over a local file.
///
/// Reads use `pread`-style positional I/O, so one reader can serve many
/// threads without a shared cursor or lock. The file size is captured once
/// when the reader is opened.
#[derive(Debug)]
pub struct FileRangeReader {
    file: Option<File>,
    size: u64,
    identifier: String,
}

impl FileRangeReader {
    /// Open a file for positional reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let identifier = path.display().to_string();

        let open_err = |source: std::io::Error| IoError::Open {
            path: identifier.clone(),
            source: Arc::new(source),
        };

        let file = File::open(path).map_err(open_err)?;
        let size = file.metadata().map_err(open_err)?.len();

        Ok(Self {
            file: Some(file),
            size,
            identifier,
        })
    }

    /// Whether [`RangeReader::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }
}

impl RangeReader for FileRangeReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| IoError::Closed(self.identifier.clone()))?;
        self.check_range(offset, len)?;

        let mut buf = vec![0u8; len];
        read_at(file, &mut buf, offset).map_err(|source| IoError::Read {
            path: self.identifier.clone(),
            offset,
            len,
            source: Arc::new(source),
        })?;
        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn close(&mut self) {
        self.file = None;
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

// =============================================================================
// MemoryRangeReader
// =============================================================================

/// Range reader over a byte buffer already in memory.
#[derive(Debug, Clone)]
pub struct MemoryRangeReader {
    data: Option<Bytes>,
    size: u64,
    identifier: String,
}

impl MemoryRangeReader {
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            size: data.len() as u64,
            data: Some(data),
            identifier: identifier.into(),
        }
    }
}

impl RangeReader for MemoryRangeReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| IoError::Closed(self.identifier.clone()))?;
        self.check_range(offset, len)?;
        let start = offset as usize;
        Ok(data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn close(&mut self) {
        self.data = None;
    }
}
