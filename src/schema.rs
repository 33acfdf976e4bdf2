//! The array schema: an immutable description of dimensions, attributes,
//! domain, tiling, and cell order, serialized to `__schema.dat`. Grounded on
//! the teacher's `header.rs` (`try_from_bytes` parsing a fixed magic +
//! little-endian fields via `bytes::Buf`), generalized from PMTiles' fixed
//! 127-byte tile-pyramid header to a variable-length, versioned schema
//! header per SPEC_FULL §4.4.

use bytes::{Buf, BufMut, BytesMut};

use crate::cellorder::CellOrder;
use crate::codec::{pack_descriptor, unpack_descriptor, CompressionId, FilterId};
use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"CLS1";
const SCHEMA_VERSION: u32 = 1;

/// Scalar element type for an attribute or the coords pseudo-attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    /// Single byte, used for strings and raw bytes.
    Char,
    /// Signed integers.
    Int8,
    Int16,
    Int32,
    Int64,
    /// Unsigned integers.
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    /// IEEE-754 floating point.
    Float32,
    Float64,
}

impl CellType {
    /// Size in bytes of one scalar element.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            CellType::Char | CellType::Int8 | CellType::Uint8 => 1,
            CellType::Int16 | CellType::Uint16 => 2,
            CellType::Int32 | CellType::Uint32 | CellType::Float32 => 4,
            CellType::Int64 | CellType::Uint64 | CellType::Float64 => 8,
        }
    }

    fn numeric(self) -> u8 {
        match self {
            CellType::Char => 0,
            CellType::Int8 => 1,
            CellType::Int16 => 2,
            CellType::Int32 => 3,
            CellType::Int64 => 4,
            CellType::Uint8 => 5,
            CellType::Uint16 => 6,
            CellType::Uint32 => 7,
            CellType::Uint64 => 8,
            CellType::Float32 => 9,
            CellType::Float64 => 10,
        }
    }

    fn from_numeric(v: u8) -> Result<Self> {
        Ok(match v {
            0 => CellType::Char,
            1 => CellType::Int8,
            2 => CellType::Int16,
            3 => CellType::Int32,
            4 => CellType::Int64,
            5 => CellType::Uint8,
            6 => CellType::Uint16,
            7 => CellType::Uint32,
            8 => CellType::Uint64,
            9 => CellType::Float32,
            10 => CellType::Float64,
            other => return Err(Error::Truncated(format!("unknown cell type code {other}"))),
        })
    }
}

/// Number of values per cell for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellValNum {
    /// Exactly one value per cell.
    Single,
    /// A fixed count `k >= 1` of values per cell.
    Fixed(u32),
    /// A variable number of values per cell (offsets stored separately).
    Variable,
}

/// A single attribute's schema.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Attribute name; must not collide with the reserved coords name.
    pub name: String,
    /// Element type.
    pub cell_type: CellType,
    /// Values per cell.
    pub cell_val_num: CellValNum,
    /// Compressor id for this attribute's fixed/data stream.
    pub compressor: crate::codec::CompressionId,
    /// Compressor id for this attribute's offsets stream (variable only).
    pub offsets_compressor: Option<crate::codec::CompressionId>,
    /// Compression level (0 = default).
    pub level: i32,
    /// Filter applied to the main stream before compression.
    pub pre_filter: FilterId,
    /// Filter applied to the main stream's compressed bytes after compression.
    pub post_filter: FilterId,
}

/// Reserved attribute name for the coordinate pseudo-attribute.
pub const COORDS_NAME: &str = "__coords";

/// The immutable array schema.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Dimension names, in declared order.
    pub dimension_names: Vec<String>,
    /// Coordinate element type, shared by all dimensions.
    pub coords_type: CellType,
    /// Inclusive (lo, hi) domain per dimension.
    pub domain: Vec<(i64, i64)>,
    /// Tile extent per dimension; presence implies a regular tile grid.
    pub tile_extents: Option<Vec<i64>>,
    /// Attributes, not including the coords pseudo-attribute.
    pub attributes: Vec<Attribute>,
    /// Cell order for sparse writes/reads.
    pub cell_order: CellOrder,
    /// Tile iteration order (row or column major only).
    pub tile_order: CellOrder,
    /// Maximum cells per tile for sparse arrays.
    pub capacity: u64,
    /// True if the array is dense (no coords stored).
    pub dense: bool,
    /// Compressor for the coords pseudo-attribute's main stream (sparse
    /// arrays only). `RleCoordRow`/`RleCoordCol` apply per SPEC_FULL §4.6's
    /// coordinate compression policy.
    pub coords_compressor: CompressionId,
}

impl Schema {
    /// Validates structural invariants from SPEC_FULL §4.4: no duplicate
    /// attribute/dimension names, no empty name sets, attribute names not
    /// colliding with the reserved coords name, dense arrays carrying tile
    /// extents, and `cell_val_num != Fixed(0)`.
    pub fn validate(&self, name_max_len: usize) -> Result<()> {
        if self.dimension_names.is_empty() {
            return Err(Error::InvalidSchema("no dimensions declared".into()));
        }
        if self.attributes.is_empty() {
            return Err(Error::InvalidSchema("no attributes declared".into()));
        }
        if self.domain.len() != self.dimension_names.len() {
            return Err(Error::InvalidSchema(
                "domain length does not match dimension count".into(),
            ));
        }
        for (lo, hi) in &self.domain {
            if lo > hi {
                return Err(Error::InvalidSchema(format!(
                    "domain bound {lo} > {hi}"
                )));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.dimension_names {
            if name.len() > name_max_len {
                return Err(Error::NameTooLong(name.clone()));
            }
            if !seen.insert(name.clone()) {
                return Err(Error::InvalidSchema(format!("duplicate dimension name {name}")));
            }
        }
        seen.clear();
        for attr in &self.attributes {
            if attr.name.len() > name_max_len {
                return Err(Error::NameTooLong(attr.name.clone()));
            }
            if attr.name == COORDS_NAME {
                return Err(Error::InvalidSchema(format!(
                    "attribute name collides with reserved coords name: {}",
                    attr.name
                )));
            }
            if !seen.insert(attr.name.clone()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate attribute name {}",
                    attr.name
                )));
            }
            if let CellValNum::Fixed(0) = attr.cell_val_num {
                return Err(Error::InvalidSchema(format!(
                    "attribute {} has cell_val_num of 0",
                    attr.name
                )));
            }
        }
        if self.dense && self.tile_extents.is_none() {
            return Err(Error::InvalidSchema(
                "dense arrays require tile extents".into(),
            ));
        }
        self.cell_order.validate(self.dimension_names.len())?;
        if self.tile_order == CellOrder::Hilbert {
            return Err(Error::InvalidSchema(
                "tile order must be row-major or column-major".into(),
            ));
        }
        Ok(())
    }

    /// Serializes the schema to its on-disk byte representation.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_slice(MAGIC);
        buf.put_u32_le(SCHEMA_VERSION);
        buf.put_u8(u8::from(self.dense));
        buf.put_u8(cell_order_numeric(self.cell_order));
        buf.put_u8(cell_order_numeric(self.tile_order));
        buf.put_u64_le(self.capacity);
        buf.put_u8(self.coords_type.numeric());
        buf.put_u8(compressor_numeric(self.coords_compressor));

        buf.put_u32_le(self.dimension_names.len() as u32);
        for name in &self.dimension_names {
            put_string(&mut buf, name);
        }
        for (lo, hi) in &self.domain {
            buf.put_i64_le(*lo);
            buf.put_i64_le(*hi);
        }
        buf.put_u8(u8::from(self.tile_extents.is_some()));
        if let Some(extents) = &self.tile_extents {
            for e in extents {
                buf.put_i64_le(*e);
            }
        }

        buf.put_u32_le(self.attributes.len() as u32);
        for attr in &self.attributes {
            put_string(&mut buf, &attr.name);
            buf.put_u8(attr.cell_type.numeric());
            put_cell_val_num(&mut buf, attr.cell_val_num);
            buf.put_u8(compressor_numeric(attr.compressor));
            buf.put_u8(u8::from(attr.offsets_compressor.is_some()));
            if let Some(oc) = attr.offsets_compressor {
                buf.put_u8(compressor_numeric(oc));
            }
            buf.put_i32_le(attr.level);
            buf.put_u16_le(pack_descriptor(attr.compressor, attr.pre_filter, attr.post_filter));
            put_filter_params(&mut buf, attr.pre_filter);
            put_filter_params(&mut buf, attr.post_filter);
        }
        buf.to_vec()
    }

    /// Parses a schema from its on-disk byte representation.
    pub fn from_bytes(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 || &buf[0..4] != MAGIC {
            return Err(Error::BadMagic);
        }
        buf.advance(4);
        let version = buf.get_u32_le();
        if version != SCHEMA_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let dense = buf.get_u8() != 0;
        let cell_order = cell_order_from_numeric(buf.get_u8())?;
        let tile_order = cell_order_from_numeric(buf.get_u8())?;
        let capacity = buf.get_u64_le();
        let coords_type = CellType::from_numeric(buf.get_u8())?;
        let coords_compressor = compressor_from_numeric(buf.get_u8())?;

        let dim_count = buf.get_u32_le() as usize;
        let mut dimension_names = Vec::with_capacity(dim_count);
        for _ in 0..dim_count {
            dimension_names.push(get_string(&mut buf)?);
        }
        let mut domain = Vec::with_capacity(dim_count);
        for _ in 0..dim_count {
            let lo = buf.get_i64_le();
            let hi = buf.get_i64_le();
            domain.push((lo, hi));
        }
        let has_extents = buf.get_u8() != 0;
        let tile_extents = if has_extents {
            let mut v = Vec::with_capacity(dim_count);
            for _ in 0..dim_count {
                v.push(buf.get_i64_le());
            }
            Some(v)
        } else {
            None
        };

        let attr_count = buf.get_u32_le() as usize;
        let mut attributes = Vec::with_capacity(attr_count);
        for _ in 0..attr_count {
            let name = get_string(&mut buf)?;
            let cell_type = CellType::from_numeric(buf.get_u8())?;
            let cell_val_num = get_cell_val_num(&mut buf)?;
            let compressor = compressor_from_numeric(buf.get_u8())?;
            let has_offsets_compressor = buf.get_u8() != 0;
            let offsets_compressor = if has_offsets_compressor {
                Some(compressor_from_numeric(buf.get_u8())?)
            } else {
                None
            };
            let level = buf.get_i32_le();
            let descriptor = buf.get_u16_le();
            let (_, pre_tag, post_tag) = unpack_descriptor(descriptor);
            let pre_filter = get_filter_params(&mut buf, pre_tag)?;
            let post_filter = get_filter_params(&mut buf, post_tag)?;
            attributes.push(Attribute {
                name,
                cell_type,
                cell_val_num,
                compressor,
                offsets_compressor,
                level,
                pre_filter,
                post_filter,
            });
        }

        Ok(Self {
            dimension_names,
            coords_type,
            domain,
            tile_extents,
            attributes,
            cell_order,
            tile_order,
            capacity,
            dense,
            coords_compressor,
        })
    }
}

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    if buf.remaining() < 4 {
        return Err(Error::Truncated("string length".into()));
    }
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return Err(Error::Truncated("string body".into()));
    }
    let bytes = &buf[..len];
    let s = String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::Truncated(format!("invalid utf8 in string: {e}")))?;
    buf.advance(len);
    Ok(s)
}

fn put_cell_val_num(buf: &mut BytesMut, v: CellValNum) {
    match v {
        CellValNum::Single => {
            buf.put_u8(0);
            buf.put_u32_le(1);
        }
        CellValNum::Fixed(k) => {
            buf.put_u8(1);
            buf.put_u32_le(k);
        }
        CellValNum::Variable => {
            buf.put_u8(2);
            buf.put_u32_le(0);
        }
    }
}

fn get_cell_val_num(buf: &mut &[u8]) -> Result<CellValNum> {
    let tag = buf.get_u8();
    let k = buf.get_u32_le();
    Ok(match tag {
        0 => CellValNum::Single,
        1 => CellValNum::Fixed(k),
        2 => CellValNum::Variable,
        other => return Err(Error::Truncated(format!("unknown cell_val_num tag {other}"))),
    })
}

fn put_filter_params(buf: &mut BytesMut, filter: FilterId) {
    let (p1, p2) = filter.params();
    buf.put_u32_le(p1);
    buf.put_u32_le(p2);
}

fn get_filter_params(buf: &mut &[u8], tag: u8) -> Result<FilterId> {
    let p1 = buf.get_u32_le();
    let p2 = buf.get_u32_le();
    FilterId::from_numeric(tag, p1, p2)
}

fn cell_order_numeric(order: CellOrder) -> u8 {
    match order {
        CellOrder::RowMajor => 0,
        CellOrder::ColMajor => 1,
        CellOrder::Hilbert => 2,
    }
}

fn cell_order_from_numeric(v: u8) -> Result<CellOrder> {
    Ok(match v {
        0 => CellOrder::RowMajor,
        1 => CellOrder::ColMajor,
        2 => CellOrder::Hilbert,
        other => return Err(Error::Truncated(format!("unknown cell order code {other}"))),
    })
}

fn compressor_numeric(id: crate::codec::CompressionId) -> u8 {
    use crate::codec::{BloscVariant, CompressionId};
    match id {
        CompressionId::None => 0,
        CompressionId::Gzip => 1,
        CompressionId::Zstd => 2,
        CompressionId::Lz4 => 3,
        CompressionId::Blosc(BloscVariant::BloscLz) => 4,
        CompressionId::Blosc(BloscVariant::Lz4) => 5,
        CompressionId::Blosc(BloscVariant::Lz4Hc) => 6,
        CompressionId::Blosc(BloscVariant::Snappy) => 7,
        CompressionId::Blosc(BloscVariant::Zlib) => 8,
        CompressionId::Blosc(BloscVariant::Zstd) => 9,
        CompressionId::Rle => 10,
        CompressionId::RleCoordRow => 11,
        CompressionId::RleCoordCol => 12,
        CompressionId::Jpeg2000 => 13,
    }
}

fn compressor_from_numeric(v: u8) -> Result<crate::codec::CompressionId> {
    use crate::codec::{BloscVariant, CompressionId};
    Ok(match v {
        0 => CompressionId::None,
        1 => CompressionId::Gzip,
        2 => CompressionId::Zstd,
        3 => CompressionId::Lz4,
        4 => CompressionId::Blosc(BloscVariant::BloscLz),
        5 => CompressionId::Blosc(BloscVariant::Lz4),
        6 => CompressionId::Blosc(BloscVariant::Lz4Hc),
        7 => CompressionId::Blosc(BloscVariant::Snappy),
        8 => CompressionId::Blosc(BloscVariant::Zlib),
        9 => CompressionId::Blosc(BloscVariant::Zstd),
        10 => CompressionId::Rle,
        11 => CompressionId::RleCoordRow,
        12 => CompressionId::RleCoordCol,
        13 => CompressionId::Jpeg2000,
        other => return Err(Error::Truncated(format!("unknown compressor code {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CompressionId;

    fn sample_schema() -> Schema {
        Schema {
            dimension_names: vec!["x".into(), "y".into()],
            coords_type: CellType::Int32,
            domain: vec![(0, 99), (0, 99)],
            tile_extents: Some(vec![10, 10]),
            attributes: vec![
                Attribute {
                    name: "a1".into(),
                    cell_type: CellType::Int32,
                    cell_val_num: CellValNum::Single,
                    compressor: CompressionId::Gzip,
                    offsets_compressor: None,
                    level: 0,
                    pre_filter: FilterId::Delta { stride: 1, elem_size: 4 },
                    post_filter: FilterId::None,
                },
                Attribute {
                    name: "a2".into(),
                    cell_type: CellType::Char,
                    cell_val_num: CellValNum::Variable,
                    compressor: CompressionId::None,
                    offsets_compressor: Some(CompressionId::Gzip),
                    level: 0,
                    pre_filter: FilterId::None,
                    post_filter: FilterId::None,
                },
            ],
            cell_order: CellOrder::RowMajor,
            tile_order: CellOrder::RowMajor,
            capacity: 100,
            dense: true,
            coords_compressor: CompressionId::None,
        }
    }

    #[test]
    fn schema_roundtrips() {
        let schema = sample_schema();
        let bytes = schema.to_bytes();
        let parsed = Schema::from_bytes(&bytes).expect("parse");
        assert_eq!(parsed.dimension_names, schema.dimension_names);
        assert_eq!(parsed.domain, schema.domain);
        assert_eq!(parsed.tile_extents, schema.tile_extents);
        assert_eq!(parsed.attributes.len(), schema.attributes.len());
        assert_eq!(parsed.attributes[1].name, "a2");
        assert!(matches!(parsed.attributes[1].cell_val_num, CellValNum::Variable));
        assert_eq!(parsed.capacity, schema.capacity);
        assert!(parsed.dense);
        assert_eq!(parsed.attributes[0].pre_filter, schema.attributes[0].pre_filter);
        assert_eq!(parsed.attributes[0].post_filter, schema.attributes[0].post_filter);
        assert_eq!(parsed.attributes[1].pre_filter, schema.attributes[1].pre_filter);
        assert_eq!(parsed.coords_compressor, schema.coords_compressor);
    }

    #[test]
    fn filter_descriptor_survives_roundtrip_even_with_both_filters_set() {
        let mut schema = sample_schema();
        schema.attributes[0].post_filter = FilterId::BitShuffle { elem_size: 4 };
        let bytes = schema.to_bytes();
        let parsed = Schema::from_bytes(&bytes).expect("parse");
        assert_eq!(parsed.attributes[0].pre_filter, FilterId::Delta { stride: 1, elem_size: 4 });
        assert_eq!(parsed.attributes[0].post_filter, FilterId::BitShuffle { elem_size: 4 });
    }

    #[test]
    fn rejects_duplicate_attribute_names() {
        let mut schema = sample_schema();
        schema.attributes[1].name = "a1".into();
        assert!(schema.validate(4096).is_err());
    }

    #[test]
    fn rejects_coords_name_collision() {
        let mut schema = sample_schema();
        schema.attributes[0].name = COORDS_NAME.into();
        assert!(schema.validate(4096).is_err());
    }

    #[test]
    fn dense_requires_tile_extents() {
        let mut schema = sample_schema();
        schema.tile_extents = None;
        assert!(schema.validate(4096).is_err());
    }
}
