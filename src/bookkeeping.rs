//! Per-fragment book-keeping: tile offsets, variable-tile offsets/sizes,
//! MBRs, and bounding coordinates. Grounded on the teacher's `directory.rs`
//! (varint-encoded, delta-compressed offset/length arrays via `varint-rs`),
//! generalized from PMTiles' single tile-id→offset/length directory to one
//! offset sequence per attribute plus the sparse-only MBR/bounds arrays from
//! SPEC_FULL §4.5.

use bytes::{Buf, BufMut, BytesMut};
use varint_rs::{VarintReader, VarintWriter};

use crate::error::{Error, Result};

/// Minimum/maximum bounding rectangle of one tile, one `[lo, hi]` pair per
/// dimension.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mbr {
    /// Per-dimension (lo, hi) bounds.
    pub bounds: Vec<(i64, i64)>,
}

impl Mbr {
    /// An MBR containing a single point.
    #[must_use]
    pub fn from_point(coord: &[i64]) -> Self {
        Self {
            bounds: coord.iter().map(|&c| (c, c)).collect(),
        }
    }

    /// Expands the MBR to include `coord`.
    pub fn expand(&mut self, coord: &[i64]) {
        for (i, &c) in coord.iter().enumerate() {
            let (lo, hi) = &mut self.bounds[i];
            if c < *lo {
                *lo = c;
            }
            if c > *hi {
                *hi = c;
            }
        }
    }

    /// True if `coord` falls inside the MBR (inclusive).
    #[must_use]
    pub fn contains(&self, coord: &[i64]) -> bool {
        self.bounds
            .iter()
            .zip(coord)
            .all(|(&(lo, hi), &c)| c >= lo && c <= hi)
    }

    /// True if `self` overlaps the subarray described by `(lo, hi)` pairs.
    #[must_use]
    pub fn overlaps(&self, subarray: &[(i64, i64)]) -> bool {
        self.bounds
            .iter()
            .zip(subarray)
            .all(|(&(lo, hi), &(slo, shi))| lo <= shi && hi >= slo)
    }
}

/// Per-attribute book-keeping: monotonic tile offsets into the attribute
/// file, and — for variable attributes — parallel variable-tile offset and
/// uncompressed-size sequences.
#[derive(Debug, Clone, Default)]
pub struct AttributeBookkeeping {
    /// Compressed tile offsets into the attribute's fixed/offset file.
    pub tile_offsets: Vec<u64>,
    /// Variable-tile offsets into the attribute's `_var` file (empty for
    /// fixed attributes).
    pub var_offsets: Vec<u64>,
    /// Uncompressed size of each variable tile (empty for fixed attributes).
    pub var_sizes: Vec<u64>,
}

/// All book-keeping for one fragment.
#[derive(Debug, Clone, Default)]
pub struct Bookkeeping {
    /// Per-attribute book-keeping, keyed by attribute name (`__coords` for
    /// the coordinate stream).
    pub attributes: std::collections::BTreeMap<String, AttributeBookkeeping>,
    /// One MBR per tile; empty for dense fragments.
    pub mbrs: Vec<Mbr>,
    /// One (first, last) bounding coordinate pair per tile; empty for dense
    /// fragments.
    pub bounding_coords: Vec<(Vec<i64>, Vec<i64>)>,
    /// Number of cells in the last (possibly partial) tile.
    pub last_tile_cell_count: u64,
}

impl Bookkeeping {
    /// Validates invariants from SPEC_FULL §3: monotonic offsets, and MBR /
    /// bounding-coord / offset sequence lengths agreeing for sparse
    /// fragments.
    pub fn validate(&self) -> Result<()> {
        for (name, a) in &self.attributes {
            if !a.tile_offsets.windows(2).all(|w| w[0] < w[1]) {
                return Err(Error::Truncated(format!(
                    "tile offsets for attribute {name} are not strictly monotonic"
                )));
            }
            if !a.var_offsets.is_empty() && a.var_offsets.len() != a.tile_offsets.len() {
                return Err(Error::Truncated(format!(
                    "variable offset count mismatch for attribute {name}"
                )));
            }
        }
        if !self.mbrs.is_empty() {
            let n = self.mbrs.len();
            if self.bounding_coords.len() != n {
                return Err(Error::Truncated(
                    "bounding coordinate count does not match MBR count".into(),
                ));
            }
        }
        Ok(())
    }

    /// Serializes to bytes (uncompressed; callers gzip-wrap via `buffer::write_gzip`).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32_le(self.attributes.len() as u32);
        for (name, a) in &self.attributes {
            put_string(&mut buf, name);
            put_delta_varints(&mut buf, &a.tile_offsets);
            put_delta_varints(&mut buf, &a.var_offsets);
            put_delta_varints(&mut buf, &a.var_sizes);
        }
        buf.put_u32_le(self.mbrs.len() as u32);
        for mbr in &self.mbrs {
            buf.put_u32_le(mbr.bounds.len() as u32);
            for (lo, hi) in &mbr.bounds {
                buf.put_i64_le(*lo);
                buf.put_i64_le(*hi);
            }
        }
        for (first, last) in &self.bounding_coords {
            buf.put_u32_le(first.len() as u32);
            for v in first {
                buf.put_i64_le(*v);
            }
            buf.put_u32_le(last.len() as u32);
            for v in last {
                buf.put_i64_le(*v);
            }
        }
        buf.put_u64_le(self.last_tile_cell_count);
        buf.to_vec()
    }

    /// Parses book-keeping from the bytes produced by `to_bytes`.
    pub fn from_bytes(mut buf: &[u8]) -> Result<Self> {
        let attr_count = get_u32(&mut buf)?;
        let mut attributes = std::collections::BTreeMap::new();
        for _ in 0..attr_count {
            let name = get_string(&mut buf)?;
            let tile_offsets = get_delta_varints(&mut buf)?;
            let var_offsets = get_delta_varints(&mut buf)?;
            let var_sizes = get_delta_varints(&mut buf)?;
            attributes.insert(
                name,
                AttributeBookkeeping {
                    tile_offsets,
                    var_offsets,
                    var_sizes,
                },
            );
        }
        let mbr_count = get_u32(&mut buf)? as usize;
        let mut mbrs = Vec::with_capacity(mbr_count);
        for _ in 0..mbr_count {
            let dims = get_u32(&mut buf)? as usize;
            let mut bounds = Vec::with_capacity(dims);
            for _ in 0..dims {
                let lo = get_i64(&mut buf)?;
                let hi = get_i64(&mut buf)?;
                bounds.push((lo, hi));
            }
            mbrs.push(Mbr { bounds });
        }
        let mut bounding_coords = Vec::with_capacity(mbr_count);
        for _ in 0..mbr_count {
            let n1 = get_u32(&mut buf)? as usize;
            let mut first = Vec::with_capacity(n1);
            for _ in 0..n1 {
                first.push(get_i64(&mut buf)?);
            }
            let n2 = get_u32(&mut buf)? as usize;
            let mut last = Vec::with_capacity(n2);
            for _ in 0..n2 {
                last.push(get_i64(&mut buf)?);
            }
            bounding_coords.push((first, last));
        }
        let last_tile_cell_count = get_u64(&mut buf)?;
        Ok(Self {
            attributes,
            mbrs,
            bounding_coords,
            last_tile_cell_count,
        })
    }
}

/// Encodes a monotonic-ish `u64` sequence as zig-zag-delta varints, the same
/// shape as the teacher's `directory.rs` tile-id delta encoding, generalized
/// to plain offsets rather than tile ids.
fn put_delta_varints(buf: &mut BytesMut, values: &[u64]) {
    buf.put_u32_le(values.len() as u32);
    let mut prev: i64 = 0;
    let mut writer = VarintBytesMutWriter(buf);
    for &v in values {
        let v = v as i64;
        let delta = v - prev;
        writer.write_i64_varint(delta).expect("BytesMut writer cannot fail");
        prev = v;
    }
}

fn get_delta_varints(buf: &mut &[u8]) -> Result<Vec<u64>> {
    let len = get_u32(buf)? as usize;
    let mut out = Vec::with_capacity(len);
    let mut prev: i64 = 0;
    let mut reader = VarintSliceReader(buf);
    for _ in 0..len {
        let delta = reader
            .read_i64_varint()
            .map_err(|e| Error::Truncated(format!("varint decode failed: {e}")))?;
        prev += delta;
        out.push(prev as u64);
    }
    Ok(out)
}

struct VarintBytesMutWriter<'a>(&'a mut BytesMut);
impl VarintWriter for VarintBytesMutWriter<'_> {
    type Error = std::io::Error;
    fn write(&mut self, byte: u8) -> std::result::Result<(), Self::Error> {
        self.0.put_u8(byte);
        Ok(())
    }
}

struct VarintSliceReader<'a, 'b>(&'a mut &'b [u8]);
impl VarintReader for VarintSliceReader<'_, '_> {
    type Error = std::io::Error;
    fn read(&mut self) -> std::result::Result<u8, Self::Error> {
        if self.0.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "varint truncated",
            ));
        }
        let b = self.0[0];
        self.0.advance(1);
        Ok(b)
    }
}

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    let len = get_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(Error::Truncated("string body".into()));
    }
    let s = String::from_utf8(buf[..len].to_vec())
        .map_err(|e| Error::Truncated(format!("invalid utf8: {e}")))?;
    buf.advance(len);
    Ok(s)
}

fn get_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(Error::Truncated("u32 field".into()));
    }
    Ok(buf.get_u32_le())
}

fn get_u64(buf: &mut &[u8]) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(Error::Truncated("u64 field".into()));
    }
    Ok(buf.get_u64_le())
}

fn get_i64(buf: &mut &[u8]) -> Result<i64> {
    if buf.remaining() < 8 {
        return Err(Error::Truncated("i64 field".into()));
    }
    Ok(buf.get_i64_le())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookkeeping_roundtrips() {
        let mut bk = Bookkeeping::default();
        bk.attributes.insert(
            "a1".into(),
            AttributeBookkeeping {
                tile_offsets: vec![0, 120, 260, 400],
                var_offsets: vec![],
                var_sizes: vec![],
            },
        );
        bk.attributes.insert(
            "__coords".into(),
            AttributeBookkeeping {
                tile_offsets: vec![0, 80, 150],
                var_offsets: vec![],
                var_sizes: vec![],
            },
        );
        bk.mbrs = vec![
            Mbr { bounds: vec![(0, 3), (0, 3)] },
            Mbr { bounds: vec![(4, 7), (4, 7)] },
        ];
        bk.bounding_coords = vec![
            (vec![0, 0], vec![3, 3]),
            (vec![4, 4], vec![7, 7]),
        ];
        bk.last_tile_cell_count = 2;
        bk.validate().expect("valid");

        let bytes = bk.to_bytes();
        let parsed = Bookkeeping::from_bytes(&bytes).expect("parse");
        assert_eq!(parsed.attributes["a1"].tile_offsets, vec![0, 120, 260, 400]);
        assert_eq!(parsed.mbrs, bk.mbrs);
        assert_eq!(parsed.bounding_coords, bk.bounding_coords);
        assert_eq!(parsed.last_tile_cell_count, 2);
    }

    #[test]
    fn mbr_expand_and_overlap() {
        let mut mbr = Mbr::from_point(&[5, 5]);
        mbr.expand(&[2, 8]);
        assert_eq!(mbr.bounds, vec![(2, 5), (5, 8)]);
        assert!(mbr.overlaps(&[(0, 3), (0, 10)]));
        assert!(!mbr.overlaps(&[(10, 20), (0, 10)]));
    }

    #[test]
    fn non_monotonic_offsets_rejected() {
        let mut bk = Bookkeeping::default();
        bk.attributes.insert(
            "a1".into(),
            AttributeBookkeeping {
                tile_offsets: vec![0, 50, 40],
                var_offsets: vec![],
                var_sizes: vec![],
            },
        );
        assert!(bk.validate().is_err());
    }
}
