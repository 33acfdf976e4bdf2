use super::Compressor;
use crate::error::{Error, Result};

/// LZ4 block-format compressor. Only compiled with the `lz4` feature.
#[cfg(feature = "lz4")]
pub struct Lz4Compressor;

#[cfg(feature = "lz4")]
impl Compressor for Lz4Compressor {
    fn compress(&self, input: &[u8], _level: i32, out: &mut Vec<u8>) -> Result<usize> {
        let compressed = lz4_flex::block::compress(input);
        out.clear();
        out.extend_from_slice(&compressed);
        Ok(out.len())
    }

    fn decompress(&self, input: &[u8], expected_size: usize, out: &mut Vec<u8>) -> Result<()> {
        let decompressed = lz4_flex::block::decompress(input, expected_size)
            .map_err(|e| Error::CodecFailure(e.to_string()))?;
        if decompressed.len() != expected_size {
            return Err(Error::SizeMismatch {
                expected: expected_size,
                actual: decompressed.len(),
            });
        }
        out.clear();
        out.extend_from_slice(&decompressed);
        Ok(())
    }
}

#[cfg(not(feature = "lz4"))]
pub struct Lz4Compressor;

#[cfg(not(feature = "lz4"))]
impl Compressor for Lz4Compressor {
    fn compress(&self, _input: &[u8], _level: i32, _out: &mut Vec<u8>) -> Result<usize> {
        Err(Error::CodecUnavailable("lz4 (feature disabled)".into()))
    }

    fn decompress(&self, _input: &[u8], _expected_size: usize, _out: &mut Vec<u8>) -> Result<()> {
        Err(Error::CodecUnavailable("lz4 (feature disabled)".into()))
    }
}
