use super::Compressor;
use crate::error::{Error, Result};

/// Zstandard compressor. Only compiled with the `zstd` feature, mirroring
/// the teacher's optional `zstd` dependency.
#[cfg(feature = "zstd")]
pub struct ZstdCompressor;

#[cfg(feature = "zstd")]
impl Compressor for ZstdCompressor {
    fn compress(&self, input: &[u8], level: i32, out: &mut Vec<u8>) -> Result<usize> {
        let level = if level == 0 { 3 } else { level };
        let compressed =
            zstd::stream::encode_all(input, level).map_err(|e| Error::CodecFailure(e.to_string()))?;
        out.clear();
        out.extend_from_slice(&compressed);
        Ok(out.len())
    }

    fn decompress(&self, input: &[u8], expected_size: usize, out: &mut Vec<u8>) -> Result<()> {
        let decompressed =
            zstd::stream::decode_all(input).map_err(|e| Error::CodecFailure(e.to_string()))?;
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

#[cfg(not(feature = "zstd"))]
pub struct ZstdCompressor;

#[cfg(not(feature = "zstd"))]
impl Compressor for ZstdCompressor {
    fn compress(&self, _input: &[u8], _level: i32, _out: &mut Vec<u8>) -> Result<usize> {
        Err(Error::CodecUnavailable("zstd (feature disabled)".into()))
    }

    fn decompress(&self, _input: &[u8], _expected_size: usize, _out: &mut Vec<u8>) -> Result<()> {
        Err(Error::CodecUnavailable("zstd (feature disabled)".into()))
    }
}
