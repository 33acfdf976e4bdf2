use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;

use super::Compressor;
use crate::error::{Error, Result};

/// DEFLATE/gzip compressor, grounded on `writer.rs::write_compressed_to`'s
/// `flate2::write::GzEncoder` usage.
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn compress(&self, input: &[u8], level: i32, out: &mut Vec<u8>) -> Result<usize> {
        let level = if level <= 0 {
            GzLevel::default()
        } else {
            GzLevel::new(level.clamp(0, 9) as u32)
        };
        out.clear();
        let mut encoder = GzEncoder::new(out, level);
        encoder
            .write_all(input)
            .map_err(|e| Error::CodecFailure(e.to_string()))?;
        let written = encoder
            .finish()
            .map_err(|e| Error::CodecFailure(e.to_string()))?;
        Ok(written.len())
    }

    fn decompress(&self, input: &[u8], expected_size: usize, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        let mut decoder = GzDecoder::new(input);
        decoder
            .read_to_end(out)
            .map_err(|e| Error::CodecFailure(e.to_string()))?;
        if out.len() != expected_size {
            return Err(Error::SizeMismatch {
                expected: expected_size,
                actual: out.len(),
            });
        }
        Ok(())
    }
}
