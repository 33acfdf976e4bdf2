use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use super::{attribute_file, attribute_var_file, provisional_name, AttributeData, CellBatch,
    BOOKKEEPING_FILE, SENTINEL_FILE};
use crate::bookkeeping::{AttributeBookkeeping, Bookkeeping, Mbr};
use crate::buffer::{write_gzip, WriteBuffer};
use crate::cellorder::{sort_permutation, CellOrder};
use crate::codec::{compressor_for, compressor_for_coords, filter_for, CompressionId, FilterId};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::schema::{CellValNum, Schema, COORDS_NAME};
use crate::storage::Backend;

/// The four write modes from SPEC_FULL §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Pre-ordered dense slab matching the array's cell order.
    DenseOrdered,
    /// Pre-ordered sparse cells, already in the array's cell order.
    SparseOrdered,
    /// Sparse cells sorted row-major, reordered to the array's cell order.
    SparseSortedRow,
    /// Sparse cells sorted col-major, reordered to the array's cell order.
    SparseSortedCol,
    /// Arbitrary-order sparse cells; sorted internally in bounded batches.
    SparseUnsorted,
}

/// Per-attribute (and, under the reserved `__coords` key, per-coordinate)
/// tile accumulation and book-keeping state. Variable attributes store a
/// per-cell, tile-relative offset array (restart at 0 each tile, per
/// SPEC_FULL invariant 6) as their "fixed" stream, with the actual payload
/// bytes accumulated separately into `var_data`.
struct AttrTileState {
    is_variable: bool,
    elem_bytes: usize,
    /// Compressor for `tile_buf`: the attribute's data stream for fixed
    /// attributes, or the per-cell offsets stream for variable attributes.
    main_compressor: CompressionId,
    /// Compressor for `var_data`, the payload stream (variable attrs only).
    var_compressor: CompressionId,
    /// Filter applied to `tile_buf` before compression.
    pre_filter: FilterId,
    /// Filter applied to `tile_buf`'s compressed bytes after compression.
    post_filter: FilterId,
    /// `Some((dims, elem_size))` for the coords stream, so its compressor
    /// can preserve the cell order's fast dimension verbatim; `None` for
    /// every other attribute.
    coord_layout: Option<(usize, usize)>,
    tile_buf: Vec<u8>,
    var_data: Vec<u8>,
    writer: WriteBuffer,
    var_writer: Option<WriteBuffer>,
    tile_offsets: Vec<u64>,
    var_offsets: Vec<u64>,
    var_sizes: Vec<u64>,
}

impl AttrTileState {
    fn push_fixed_cell(&mut self, bytes: &[u8]) {
        self.tile_buf.extend_from_slice(bytes);
    }

    fn push_variable_cell(&mut self, payload: &[u8]) {
        let local_offset = self.var_data.len() as u64;
        self.tile_buf.extend_from_slice(&local_offset.to_le_bytes());
        self.var_data.extend_from_slice(payload);
    }

    fn flush_tile(&mut self) -> Result<()> {
        let had_cells = !self.tile_buf.is_empty();
        if had_cells {
            let offset = self.writer.bytes_written();
            filter_for(self.pre_filter).code(&mut self.tile_buf)?;
            let compressor = match self.coord_layout {
                Some((dims, elem_size)) => compressor_for_coords(self.main_compressor, dims, elem_size)?,
                None => compressor_for(self.main_compressor)?,
            };
            let mut compressed = Vec::new();
            compressor.compress(&self.tile_buf, 0, &mut compressed)?;
            filter_for(self.post_filter).code(&mut compressed)?;
            self.writer.append(&compressed)?;
            self.tile_offsets.push(offset);
            self.tile_buf.clear();
        }
        // A variable tile's var_offsets/var_sizes entry must parallel its
        // tile_offsets entry one-to-one even when every cell in the tile is
        // zero-length, so this is keyed on `had_cells`, not on payload size.
        if self.is_variable && had_cells {
            let var_offset = self
                .var_writer
                .as_ref()
                .map_or(0, WriteBuffer::bytes_written);
            let uncompressed_size = self.var_data.len() as u64;
            let compressor = compressor_for(self.var_compressor)?;
            let mut compressed = Vec::new();
            compressor.compress(&self.var_data, 0, &mut compressed)?;
            if let Some(vw) = &mut self.var_writer {
                vw.append(&compressed)?;
            }
            self.var_offsets.push(var_offset);
            self.var_sizes.push(uncompressed_size);
            self.var_data.clear();
        }
        Ok(())
    }

    fn finalize(mut self) -> Result<(Vec<u64>, Vec<u64>, Vec<u64>)> {
        self.flush_tile()?;
        self.writer.finalize()?;
        if let Some(vw) = &mut self.var_writer {
            vw.finalize()?;
        }
        Ok((self.tile_offsets, self.var_offsets, self.var_sizes))
    }
}

/// Writes one new fragment. State machine: `new` → repeated `write_batch` →
/// `finalize` (commits) or `abort` (discards), matching SPEC_FULL §4.6.
/// Grounded on the teacher's `writer.rs` (`PmTilesStreamWriter`'s
/// accumulate-then-flush tile loop), generalized from one opaque tile per
/// blob to one tile per attribute with shared cell-count tiling.
pub struct FragmentWriter {
    backend: Arc<dyn Backend>,
    schema: Arc<Schema>,
    mode: WriteMode,
    fragment_name: String,
    provisional_path: String,
    attrs: BTreeMap<String, AttrTileState>,
    tile_cells: u64,
    cells_in_tile: u64,
    total_cells: u64,
    current_mbr: Option<Mbr>,
    tile_first_coord: Option<Vec<i64>>,
    tile_last_coord: Option<Vec<i64>>,
    mbrs: Vec<Mbr>,
    bounding_coords: Vec<(Vec<i64>, Vec<i64>)>,
    finalized: bool,
}

impl FragmentWriter {
    /// Opens a new provisional fragment directory at `<array_dir>/.{name}`.
    pub fn new(
        backend: Arc<dyn Backend>,
        schema: Arc<Schema>,
        config: Config,
        array_dir: &str,
        fragment_name: impl Into<String>,
        mode: WriteMode,
    ) -> Result<Self> {
        let fragment_name = fragment_name.into();
        let provisional_path = format!("{array_dir}/{}", provisional_name(&fragment_name));
        backend.mkdir_all(&provisional_path)?;
        let chunk_size = config.upload_buffer_size;

        let mut attrs = BTreeMap::new();
        for attr in &schema.attributes {
            let is_variable = matches!(attr.cell_val_num, CellValNum::Variable);
            let elem_bytes = if is_variable {
                8 // tile-relative u64 offset entry
            } else {
                attr.cell_type.size()
                    * match attr.cell_val_num {
                        CellValNum::Single => 1,
                        CellValNum::Fixed(k) => k as usize,
                        CellValNum::Variable => unreachable!(),
                    }
            };
            let path = format!("{provisional_path}/{}", attribute_file(&attr.name));
            let var_path = format!("{provisional_path}/{}", attribute_var_file(&attr.name));
            let (main_compressor, var_compressor) = if is_variable {
                (attr.offsets_compressor.unwrap_or(CompressionId::None), attr.compressor)
            } else {
                (attr.compressor, CompressionId::None)
            };
            attrs.insert(
                attr.name.clone(),
                AttrTileState {
                    is_variable,
                    elem_bytes,
                    main_compressor,
                    var_compressor,
                    pre_filter: attr.pre_filter,
                    post_filter: attr.post_filter,
                    coord_layout: None,
                    tile_buf: Vec::new(),
                    var_data: Vec::new(),
                    writer: WriteBuffer::with_chunk_size(backend.clone(), path, chunk_size),
                    var_writer: is_variable.then(|| {
                        WriteBuffer::with_chunk_size(backend.clone(), var_path, chunk_size)
                    }),
                    tile_offsets: Vec::new(),
                    var_offsets: Vec::new(),
                    var_sizes: Vec::new(),
                },
            );
        }

        if !schema.dense {
            let coord_path = format!("{provisional_path}/{}", attribute_file(COORDS_NAME));
            let coord_elem_size = schema.coords_type.size();
            let coord_dims = schema.dimension_names.len();
            attrs.insert(
                COORDS_NAME.into(),
                AttrTileState {
                    is_variable: false,
                    elem_bytes: coord_elem_size * coord_dims,
                    main_compressor: schema.coords_compressor,
                    var_compressor: CompressionId::None,
                    pre_filter: FilterId::None,
                    post_filter: FilterId::None,
                    coord_layout: Some((coord_dims, coord_elem_size)),
                    tile_buf: Vec::new(),
                    var_data: Vec::new(),
                    writer: WriteBuffer::with_chunk_size(backend.clone(), coord_path, chunk_size),
                    var_writer: None,
                    tile_offsets: Vec::new(),
                    var_offsets: Vec::new(),
                    var_sizes: Vec::new(),
                },
            );
        }

        let tile_cells = schema
            .tile_extents
            .as_ref()
            .map_or(schema.capacity, |extents| {
                extents.iter().map(|&e| e as u64).product()
            })
            .max(1);

        Ok(Self {
            backend,
            schema,
            mode,
            fragment_name,
            provisional_path,
            attrs,
            tile_cells,
            cells_in_tile: 0,
            total_cells: 0,
            current_mbr: None,
            tile_first_coord: None,
            tile_last_coord: None,
            mbrs: Vec::new(),
            bounding_coords: Vec::new(),
            finalized: false,
        })
    }

    /// Writes one batch of cells, dispatching according to the configured
    /// write mode. On error the provisional directory is removed and the
    /// error is propagated, per SPEC_FULL §4.6's failure semantics.
    pub fn write_batch(&mut self, batch: CellBatch) -> Result<()> {
        if self.finalized {
            return Err(Error::InvalidState("write_batch called after finalize".into()));
        }
        let result = match self.mode {
            WriteMode::DenseOrdered => self.ingest_dense(batch),
            WriteMode::SparseOrdered => self.ingest_sparse(batch),
            WriteMode::SparseSortedRow => self.ingest_sparse_reordered(batch, CellOrder::RowMajor),
            WriteMode::SparseSortedCol => self.ingest_sparse_reordered(batch, CellOrder::ColMajor),
            WriteMode::SparseUnsorted => self.ingest_sparse_unsorted(batch),
        };
        if result.is_err() {
            let _ = self.abort();
        }
        result
    }

    fn ingest_dense(&mut self, batch: CellBatch) -> Result<()> {
        if !self.schema.dense {
            return Err(Error::InvalidState("dense write on a sparse schema".into()));
        }
        let n = batch
            .attributes
            .iter()
            .next()
            .map(|(name, data)| {
                let elem_bytes = self.attrs[name].elem_bytes;
                data.cell_count(elem_bytes)
            })
            .unwrap_or(0);
        for idx in 0..n {
            self.push_attrs_only(&batch, idx)?;
            self.advance_cell()?;
        }
        Ok(())
    }

    fn ingest_sparse(&mut self, batch: CellBatch) -> Result<()> {
        if self.schema.dense {
            return Err(Error::InvalidState("sparse write on a dense schema".into()));
        }
        for idx in 0..batch.coords.len() {
            self.push_sparse_cell(&batch, idx)?;
        }
        Ok(())
    }

    fn ingest_sparse_reordered(&mut self, batch: CellBatch, order: CellOrder) -> Result<()> {
        let _ = order; // caller's claimed input order; we always sort to the schema's cell order
        let perm = sort_permutation(&batch.coords, self.schema.cell_order, 16)?;
        for idx in perm {
            self.push_sparse_cell(&batch, idx)?;
        }
        Ok(())
    }

    fn ingest_sparse_unsorted(&mut self, batch: CellBatch) -> Result<()> {
        const APPROX_CELL_BYTES: usize = 64;
        let budget = 10 * 1024 * 1024;
        let batch_cells = (budget / APPROX_CELL_BYTES).max(1);
        let n = batch.coords.len();
        let mut start = 0;
        while start < n {
            let end = (start + batch_cells).min(n);
            let sub = slice_batch(&batch, start..end);
            let perm = sort_permutation(&sub.coords, self.schema.cell_order, 16)?;
            for idx in perm {
                self.push_sparse_cell(&sub, idx)?;
            }
            start = end;
        }
        Ok(())
    }

    fn push_sparse_cell(&mut self, batch: &CellBatch, idx: usize) -> Result<()> {
        let coord = &batch.coords[idx];
        match &mut self.current_mbr {
            None => {
                self.current_mbr = Some(Mbr::from_point(coord));
                self.tile_first_coord = Some(coord.clone());
            }
            Some(mbr) => mbr.expand(coord),
        }
        self.tile_last_coord = Some(coord.clone());

        let coord_state = self.attrs.get_mut(COORDS_NAME).expect("coords state exists for sparse schema");
        let elem_size = self.schema.coords_type.size();
        let encoded = encode_coord(coord, elem_size);
        coord_state.push_fixed_cell(&encoded);

        self.push_attrs_only(batch, idx)?;
        self.advance_cell()
    }

    fn push_attrs_only(&mut self, batch: &CellBatch, idx: usize) -> Result<()> {
        for (name, data) in &batch.attributes {
            let state = self
                .attrs
                .get_mut(name)
                .ok_or_else(|| Error::UnknownName(name.clone()))?;
            match data {
                AttributeData::Fixed(bytes) => {
                    let start = idx * state.elem_bytes;
                    let end = start + state.elem_bytes;
                    if end > bytes.len() {
                        return Err(Error::Truncated(format!(
                            "attribute {name} batch shorter than its declared cell count"
                        )));
                    }
                    state.push_fixed_cell(&bytes[start..end]);
                }
                AttributeData::Variable { data, offsets } => {
                    let start = offsets[idx] as usize;
                    let end = offsets.get(idx + 1).map_or(data.len(), |&o| o as usize);
                    state.push_variable_cell(&data[start..end]);
                }
            }
        }
        Ok(())
    }

    fn advance_cell(&mut self) -> Result<()> {
        self.cells_in_tile += 1;
        self.total_cells += 1;
        if self.cells_in_tile >= self.tile_cells {
            self.flush_tile()?;
        }
        Ok(())
    }

    fn flush_tile(&mut self) -> Result<()> {
        if self.cells_in_tile == 0 {
            return Ok(());
        }
        for state in self.attrs.values_mut() {
            state.flush_tile()?;
        }
        if !self.schema.dense {
            if let Some(mbr) = self.current_mbr.take() {
                self.mbrs.push(mbr);
            }
            if let (Some(first), Some(last)) =
                (self.tile_first_coord.take(), self.tile_last_coord.take())
            {
                self.bounding_coords.push((first, last));
            }
        }
        self.cells_in_tile = 0;
        Ok(())
    }

    /// Flushes remaining partial tiles, writes book-keeping, syncs all
    /// files, writes the sentinel, and atomically commits the fragment by
    /// renaming away its leading dot.
    pub fn finalize(mut self) -> Result<String> {
        let last_tile_cell_count = if self.schema.dense {
            0
        } else {
            let rem = self.total_cells % self.tile_cells;
            if rem == 0 && self.total_cells > 0 {
                self.tile_cells
            } else {
                rem
            }
        };
        self.flush_tile()?;

        let mut bookkeeping = Bookkeeping {
            last_tile_cell_count,
            mbrs: std::mem::take(&mut self.mbrs),
            bounding_coords: std::mem::take(&mut self.bounding_coords),
            ..Bookkeeping::default()
        };

        let attrs = std::mem::take(&mut self.attrs);
        for (name, state) in attrs {
            let (tile_offsets, var_offsets, var_sizes) = state.finalize()?;
            bookkeeping.attributes.insert(
                name,
                AttributeBookkeeping {
                    tile_offsets,
                    var_offsets,
                    var_sizes,
                },
            );
        }
        bookkeeping.validate()?;

        let bk_bytes = bookkeeping.to_bytes();
        write_gzip(
            self.backend.as_ref(),
            &format!("{}/{BOOKKEEPING_FILE}", self.provisional_path),
            &bk_bytes,
        )?;
        self.backend
            .create_empty_file(&format!("{}/{SENTINEL_FILE}", self.provisional_path))?;

        let array_dir = self
            .provisional_path
            .rsplit_once('/')
            .map_or("", |(dir, _)| dir);
        let committed_path = format!("{array_dir}/{}", self.fragment_name);
        self.backend.rename(&self.provisional_path, &committed_path)?;
        self.finalized = true;
        debug!("committed fragment {committed_path}");
        Ok(committed_path)
    }

    /// Discards the provisional fragment directory. Called automatically by
    /// `write_batch` on error.
    pub fn abort(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.backend.remove_dir_recursive(&self.provisional_path)
    }
}

fn encode_coord(coord: &[i64], elem_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(coord.len() * elem_size);
    for &c in coord {
        out.extend_from_slice(&c.to_le_bytes()[..elem_size]);
    }
    out
}

fn slice_batch(batch: &CellBatch, range: std::ops::Range<usize>) -> CellBatch {
    let coords = batch.coords[range.clone()].to_vec();
    let mut attributes = BTreeMap::new();
    for (name, data) in &batch.attributes {
        let sliced = match data {
            AttributeData::Fixed(bytes) => {
                let elem = bytes.len() / batch.coords.len().max(1);
                AttributeData::Fixed(bytes[range.start * elem..range.end * elem].to_vec())
            }
            AttributeData::Variable { data, offsets } => {
                let start = offsets[range.start] as usize;
                let end = offsets.get(range.end).map_or(data.len(), |&o| o as usize);
                let sub_offsets: Vec<u64> = offsets[range.clone()]
                    .iter()
                    .map(|&o| o - offsets[range.start])
                    .collect();
                AttributeData::Variable {
                    data: data[start..end].to_vec(),
                    offsets: sub_offsets,
                }
            }
        };
        attributes.insert(name.clone(), sliced);
    }
    CellBatch { coords, attributes }
}
