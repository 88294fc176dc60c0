mod file_reader;
mod range_reader;

pub use file_reader::{FileRangeReader, MemoryRangeReader};
pub use range_reader::RangeReader;
