mod file_reader;
mod range_reader;

pub use file_reader::LocalFileReader;
pub use range_reader::{read_f32_le, read_u16_le, read_u32_le, read_u64_le, RangeReader};
