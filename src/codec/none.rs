use super::Compressor;
use crate::error::{Error, Result};

/// Identity compressor, used for the coords attribute of dense arrays and
/// any attribute whose schema requests no compression.
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn compress(&self, input: &[u8], _level: i32, out: &mut Vec<u8>) -> Result<usize> {
        out.clear();
        out.extend_from_slice(input);
        Ok(out.len())
    }

    fn decompress(&self, input: &[u8], expected_size: usize, out: &mut Vec<u8>) -> Result<()> {
        if input.len() != expected_size {
            return Err(Error::SizeMismatch {
                expected: expected_size,
                actual: input.len(),
            });
        }
        out.clear();
        out.extend_from_slice(input);
        Ok(())
    }
}
