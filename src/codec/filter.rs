//! Pre/post-compression filters: delta encoding and bit shuffle, per
//! SPEC_FULL §4.3. No teacher file models this (PMTiles tiles are opaque
//! blobs); grounded on the spec's own description of TileDB-style codec
//! filters, expressed as a small in-place trait analogous to `Compressor`.

use crate::error::{Error, Result};

/// Identifies a filter. Values form a nibble of the on-disk compression
/// descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterId {
    /// Identity filter.
    None,
    /// Delta encoding with a configured stride and element width.
    Delta {
        /// Number of elements back each element is diffed against.
        stride: usize,
        /// Size in bytes of one element (1, 2, 4, or 8).
        elem_size: usize,
    },
    /// Bit/byte shuffle with a configured element width.
    BitShuffle {
        /// Size in bytes of one element.
        elem_size: usize,
    },
}

impl FilterId {
    pub(crate) fn numeric(self) -> u8 {
        match self {
            FilterId::None => 0,
            FilterId::Delta { .. } => 1,
            FilterId::BitShuffle { .. } => 2,
        }
    }

    /// Reconstructs a `FilterId` from its descriptor nibble plus the two
    /// `u32` parameter slots schema serialization stores alongside it.
    pub(crate) fn from_numeric(tag: u8, param1: u32, param2: u32) -> Result<Self> {
        Ok(match tag {
            0 => FilterId::None,
            1 => FilterId::Delta {
                stride: param1 as usize,
                elem_size: param2 as usize,
            },
            2 => FilterId::BitShuffle {
                elem_size: param2 as usize,
            },
            other => return Err(Error::Truncated(format!("unknown filter id code {other}"))),
        })
    }

    /// The two `u32` parameter slots this filter's descriptor needs
    /// persisted alongside its nibble (stride/elem_size; zero where unused).
    pub(crate) fn params(self) -> (u32, u32) {
        match self {
            FilterId::None => (0, 0),
            FilterId::Delta { stride, elem_size } => (stride as u32, elem_size as u32),
            FilterId::BitShuffle { elem_size } => (0, elem_size as u32),
        }
    }
}

/// Resolves a `FilterId` to its invertible transform.
#[must_use]
pub fn filter_for(id: FilterId) -> Box<dyn Filter> {
    match id {
        FilterId::None => Box::new(NullFilter),
        FilterId::Delta { stride, elem_size } => Box::new(DeltaEncode { stride, elem_size }),
        FilterId::BitShuffle { elem_size } => Box::new(BitShuffle { elem_size }),
    }
}

/// An in-place, invertible transform applied before compression (`code`) and
/// reversed after decompression (`decode`).
pub trait Filter: Send + Sync {
    /// Applies the forward transform in place.
    fn code(&self, buf: &mut [u8]) -> Result<()>;
    /// Applies the inverse transform in place.
    fn decode(&self, buf: &mut [u8]) -> Result<()>;
}

/// Identity filter.
pub struct NullFilter;

impl Filter for NullFilter {
    fn code(&self, _buf: &mut [u8]) -> Result<()> {
        Ok(())
    }
    fn decode(&self, _buf: &mut [u8]) -> Result<()> {
        Ok(())
    }
}

/// Delta-encodes a buffer of fixed-width integer elements: each element
/// (after the first `stride` elements) is replaced by its difference from
/// the element `stride` positions back.
pub struct DeltaEncode {
    /// Elements back to diff against.
    pub stride: usize,
    /// Element width in bytes: 1, 2, 4, or 8.
    pub elem_size: usize,
}

impl DeltaEncode {
    fn check_len(&self, len: usize) -> Result<usize> {
        let unit = self.stride * self.elem_size;
        if unit == 0 || len % unit != 0 {
            return Err(Error::StrideMismatch {
                stride: self.stride,
                len,
            });
        }
        Ok(len / self.elem_size)
    }
}

macro_rules! delta_pass {
    ($buf:expr, $ty:ty, $stride:expr, $n:expr, $encode:expr) => {{
        let mut values: Vec<$ty> = (0..$n)
            .map(|i| {
                let start = i * std::mem::size_of::<$ty>();
                <$ty>::from_le_bytes(
                    $buf[start..start + std::mem::size_of::<$ty>()]
                        .try_into()
                        .expect("slice has exact width"),
                )
            })
            .collect();
        if $encode {
            for i in ($stride..$n).rev() {
                values[i] = values[i].wrapping_sub(values[i - $stride]);
            }
        } else {
            for i in $stride..$n {
                values[i] = values[i].wrapping_add(values[i - $stride]);
            }
        }
        for (i, v) in values.iter().enumerate() {
            let start = i * std::mem::size_of::<$ty>();
            $buf[start..start + std::mem::size_of::<$ty>()].copy_from_slice(&v.to_le_bytes());
        }
    }};
}

impl Filter for DeltaEncode {
    fn code(&self, buf: &mut [u8]) -> Result<()> {
        let n = self.check_len(buf.len())?;
        match self.elem_size {
            1 => delta_pass!(buf, u8, self.stride, n, true),
            2 => delta_pass!(buf, u16, self.stride, n, true),
            4 => delta_pass!(buf, u32, self.stride, n, true),
            8 => delta_pass!(buf, u64, self.stride, n, true),
            other => {
                return Err(Error::CodecFailure(format!(
                    "unsupported delta element size {other}"
                )))
            }
        }
        Ok(())
    }

    fn decode(&self, buf: &mut [u8]) -> Result<()> {
        let n = self.check_len(buf.len())?;
        match self.elem_size {
            1 => delta_pass!(buf, u8, self.stride, n, false),
            2 => delta_pass!(buf, u16, self.stride, n, false),
            4 => delta_pass!(buf, u32, self.stride, n, false),
            8 => delta_pass!(buf, u64, self.stride, n, false),
            other => {
                return Err(Error::CodecFailure(format!(
                    "unsupported delta element size {other}"
                )))
            }
        }
        Ok(())
    }
}

/// Bit/byte shuffle: reorders the bytes of a fixed-width-element buffer so
/// that the most significant byte of every element comes first, then the
/// next most significant, and so on.
pub struct BitShuffle {
    /// Element width in bytes.
    pub elem_size: usize,
}

impl BitShuffle {
    fn check_len(&self, len: usize) -> Result<usize> {
        let unit = 8 * self.elem_size;
        if unit == 0 || len % unit != 0 {
            return Err(Error::StrideMismatch {
                stride: unit,
                len,
            });
        }
        Ok(len / self.elem_size)
    }
}

impl Filter for BitShuffle {
    fn code(&self, buf: &mut [u8]) -> Result<()> {
        let n = self.check_len(buf.len())?;
        let mut shuffled = vec![0u8; buf.len()];
        for elem in 0..n {
            for byte in 0..self.elem_size {
                let src = elem * self.elem_size + byte;
                let dst = byte * n + elem;
                shuffled[dst] = buf[src];
            }
        }
        buf.copy_from_slice(&shuffled);
        Ok(())
    }

    fn decode(&self, buf: &mut [u8]) -> Result<()> {
        let n = self.check_len(buf.len())?;
        let mut unshuffled = vec![0u8; buf.len()];
        for elem in 0..n {
            for byte in 0..self.elem_size {
                let src = byte * n + elem;
                let dst = elem * self.elem_size + byte;
                unshuffled[dst] = buf[src];
            }
        }
        buf.copy_from_slice(&unshuffled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_roundtrips() {
        let filter = DeltaEncode {
            stride: 1,
            elem_size: 4,
        };
        let original: Vec<i32> = vec![10, 12, 9, 20, 5];
        let mut buf: Vec<u8> = original.iter().flat_map(|v| v.to_le_bytes()).collect();
        filter.code(&mut buf).expect("code");
        filter.decode(&mut buf).expect("decode");
        let roundtripped: Vec<i32> = buf
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().expect("4 bytes")))
            .collect();
        assert_eq!(roundtripped, original);
    }

    #[test]
    fn bitshuffle_roundtrips() {
        let filter = BitShuffle { elem_size: 4 };
        let original: Vec<u32> = (0..16).collect();
        let mut buf: Vec<u8> = original.iter().flat_map(|v| v.to_le_bytes()).collect();
        filter.code(&mut buf).expect("code");
        filter.decode(&mut buf).expect("decode");
        let roundtripped: Vec<u32> = buf
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().expect("4 bytes")))
            .collect();
        assert_eq!(roundtripped, original);
    }

    #[test]
    fn filter_id_numeric_roundtrips() {
        for id in [
            FilterId::None,
            FilterId::Delta { stride: 2, elem_size: 4 },
            FilterId::BitShuffle { elem_size: 8 },
        ] {
            let (p1, p2) = id.params();
            let back = FilterId::from_numeric(id.numeric(), p1, p2).expect("known tag");
            assert_eq!(back, id);
        }
    }

    #[test]
    fn filter_for_dispatches_and_roundtrips() {
        let original: Vec<i32> = vec![10, 12, 9, 20, 5];
        let mut buf: Vec<u8> = original.iter().flat_map(|v| v.to_le_bytes()).collect();
        let filter = filter_for(FilterId::Delta { stride: 1, elem_size: 4 });
        filter.code(&mut buf).expect("code");
        filter.decode(&mut buf).expect("decode");
        let roundtripped: Vec<i32> = buf
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().expect("4 bytes")))
            .collect();
        assert_eq!(roundtripped, original);
    }

    #[test]
    fn stride_mismatch_is_rejected() {
        let filter = DeltaEncode {
            stride: 3,
            elem_size: 4,
        };
        let mut buf = vec![0u8; 20]; // 5 elements, not a multiple of 3
        assert!(matches!(filter.code(&mut buf), Err(Error::StrideMismatch { .. })));
    }
}
