use super::{compressor_impl_for_variant, BloscVariant, Compressor};
use crate::error::Result;

/// Models the shape of native Blosc's sub-compressor multiplexing without
/// vendoring the C library: dispatches to one of this registry's own
/// compressors (see `DESIGN.md`, Open Question decision 2). Preserves the
/// round-trip property (testable property 2) but is not bit-compatible with
/// an actual Blosc container.
pub struct BloscCompressor {
    variant: BloscVariant,
}

impl BloscCompressor {
    pub fn new(variant: BloscVariant) -> Self {
        Self { variant }
    }
}

impl Compressor for BloscCompressor {
    fn compress(&self, input: &[u8], level: i32, out: &mut Vec<u8>) -> Result<usize> {
        compressor_impl_for_variant(self.variant).compress(input, level, out)
    }

    fn decompress(&self, input: &[u8], expected_size: usize, out: &mut Vec<u8>) -> Result<()> {
        compressor_impl_for_variant(self.variant).decompress(input, expected_size, out)
    }
}
