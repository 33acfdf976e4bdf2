//! The array coordinator: owns the schema, the committed fragment list, and
//! an asynchronous request queue, and arbitrates read/write/consolidate
//! access per SPEC_FULL §4.9. The async queue is grounded on the same
//! producer/consumer shape the example corpus uses for background work — a
//! channel feeding one consumer thread guarded by `parking_lot` state (see
//! `openarc-core`'s orchestrator progress thread) — adapted here from a
//! progress-reporting sidecar to the coordinator's own dispatch loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};

use crate::cellorder::{sort_permutation, CellOrder};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::expr::Predicate;
use crate::fragment::{AttributeData, CellBatch, FragmentReader, FragmentWriter, WriteMode};
use crate::schema::Schema;
use crate::storage::Backend;

/// The coordinator's operating mode, per SPEC_FULL §4.9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorMode {
    /// Read cells in on-disk order.
    Read,
    /// Read cells, merge-sorted row-major across fragments.
    ReadSortedRow,
    /// Read cells, merge-sorted column-major across fragments.
    ReadSortedCol,
    /// Write pre-ordered cells matching the array's cell order.
    Write,
    /// Write cells sorted row-major by the caller.
    WriteSortedRow,
    /// Write cells sorted column-major by the caller.
    WriteSortedCol,
    /// Write arbitrary-order cells; sorted internally in bounded batches.
    WriteUnsorted,
    /// Merge existing fragments together.
    Consolidate,
}

impl CoordinatorMode {
    fn write_mode(self) -> Option<WriteMode> {
        match self {
            CoordinatorMode::Write => Some(WriteMode::SparseOrdered),
            CoordinatorMode::WriteSortedRow => Some(WriteMode::SparseSortedRow),
            CoordinatorMode::WriteSortedCol => Some(WriteMode::SparseSortedCol),
            CoordinatorMode::WriteUnsorted => Some(WriteMode::SparseUnsorted),
            _ => None,
        }
    }

    fn read_sort_order(self) -> Option<CellOrder> {
        match self {
            CoordinatorMode::ReadSortedRow => Some(CellOrder::RowMajor),
            CoordinatorMode::ReadSortedCol => Some(CellOrder::ColMajor),
            _ => None,
        }
    }
}

/// Merged, possibly predicate-filtered, read output across every fragment
/// and tile a request touched.
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    /// One coordinate tuple per surviving cell; empty for dense reads.
    pub coords: Vec<Vec<i64>>,
    /// Per-attribute cell data, concatenated in the same cell order as
    /// `coords`.
    pub attributes: BTreeMap<String, AttributeData>,
    /// True if any tile touched by this read was truncated by the per-tile
    /// cell cap (SPEC_FULL §4.7's overflow contract).
    pub overflowed: bool,
}

fn append_attribute_data(dst: &mut AttributeData, src: &AttributeData) {
    match (dst, src) {
        (AttributeData::Fixed(d), AttributeData::Fixed(s)) => d.extend_from_slice(s),
        (
            AttributeData::Variable { data: dd, offsets: doff },
            AttributeData::Variable { data: sd, offsets: soff },
        ) => {
            let base = dd.len() as u64;
            doff.extend(soff.iter().map(|&o| o + base));
            dd.extend_from_slice(sd);
        }
        _ => unreachable!("attribute variability is fixed by schema"),
    }
}

/// Shared coordinator state, referenced by both the synchronous facade and
/// the async worker thread.
struct State {
    backend: Arc<dyn Backend>,
    schema: Arc<Schema>,
    config: Config,
    array_dir: String,
    fragments: RwLock<Vec<String>>,
    next_fragment_id: AtomicU64,
}

/// Owns the active schema, the open fragment list, and an async request
/// queue for one array.
pub struct ArrayCoordinator {
    state: Arc<State>,
    worker: Option<JoinHandle<()>>,
    sender: Option<flume::Sender<Request>>,
    cancel: Arc<AtomicBool>,
}

/// Status of a request submitted through the async queue.
#[derive(Debug, Clone)]
pub enum RequestStatus {
    /// The worker has not yet finished this request.
    InProgress,
    /// The request finished with no issues.
    Completed,
    /// The request finished, but at least one tile's output was truncated
    /// by the caller's buffer cap.
    Overflow,
    /// The request failed; the string is the error's display text.
    Error(String),
}

enum RequestKind {
    Read {
        mode: CoordinatorMode,
        subarray: Vec<(i64, i64)>,
        attribute_names: Vec<String>,
        predicate: Option<Arc<Predicate>>,
        max_cells_per_tile: Option<usize>,
        out: Arc<Mutex<Option<ReadResult>>>,
    },
    Write {
        mode: CoordinatorMode,
        batch: CellBatch,
    },
    Consolidate {
        batch_size: usize,
    },
}

struct Request {
    kind: RequestKind,
    status: Arc<Mutex<RequestStatus>>,
    done: flume::Sender<()>,
}

/// A handle to an in-flight or completed async request.
pub struct RequestHandle {
    status: Arc<Mutex<RequestStatus>>,
    done: flume::Receiver<()>,
}

impl RequestHandle {
    /// Current status without blocking.
    #[must_use]
    pub fn poll(&self) -> RequestStatus {
        self.status.lock().clone()
    }

    /// Blocks until the request completes (or errors/overflows).
    pub fn wait(&self) -> RequestStatus {
        let _ = self.done.recv();
        self.status.lock().clone()
    }
}

/// Serialized schema file name within an array directory, per SPEC_FULL §6.
pub const SCHEMA_FILE: &str = "__schema.dat";
/// Array-level sentinel, mirroring the fragment sentinel convention.
pub const ARRAY_SENTINEL: &str = "__array.ok";

impl ArrayCoordinator {
    /// Creates a brand new array directory, persisting `schema` to
    /// `__schema.dat` and writing the array sentinel, then opens it.
    pub fn create(
        backend: Arc<dyn Backend>,
        schema: Arc<Schema>,
        config: Config,
        array_dir: impl Into<String>,
    ) -> Result<Self> {
        let array_dir = array_dir.into();
        backend.mkdir_all(&array_dir)?;
        let schema_path = format!("{array_dir}/{SCHEMA_FILE}");
        backend.create_empty_file(&schema_path)?;
        backend.append_write(&schema_path, &schema.to_bytes())?;
        backend.create_empty_file(&format!("{array_dir}/{ARRAY_SENTINEL}"))?;
        Self::open(backend, schema, config, array_dir)
    }

    /// Opens an existing array directory, loading its schema from
    /// `__schema.dat`.
    pub fn open_existing(backend: Arc<dyn Backend>, config: Config, array_dir: impl Into<String>) -> Result<Self> {
        let array_dir = array_dir.into();
        if !backend.exists_file(&format!("{array_dir}/{ARRAY_SENTINEL}"))? {
            return Err(Error::NotFound(array_dir));
        }
        let schema_path = format!("{array_dir}/{SCHEMA_FILE}");
        let len = backend.size(&schema_path)?;
        let mut bytes = vec![0u8; len as usize];
        backend.read_at(&schema_path, 0, &mut bytes)?;
        let schema = Arc::new(Schema::from_bytes(&bytes)?);
        Self::open(backend, schema, config, array_dir)
    }

    /// Opens the coordinator for an existing (or brand new, empty) array
    /// directory, discovering already-committed fragments by their sentinel
    /// files.
    pub fn open(
        backend: Arc<dyn Backend>,
        schema: Arc<Schema>,
        config: Config,
        array_dir: impl Into<String>,
    ) -> Result<Self> {
        let array_dir = array_dir.into();
        backend.mkdir_all(&array_dir)?;
        let mut fragments = Vec::new();
        for name in backend.list_dirs(&array_dir)? {
            if name.starts_with('.') {
                continue; // provisional fragment, ignore
            }
            let path = format!("{array_dir}/{name}");
            if backend.exists_file(&format!("{path}/{}", crate::fragment::SENTINEL_FILE))? {
                fragments.push(path);
            }
        }
        fragments.sort();
        let state = Arc::new(State {
            backend,
            schema,
            config,
            array_dir,
            fragments: RwLock::new(fragments),
            next_fragment_id: AtomicU64::new(0),
        });
        Ok(Self {
            state,
            worker: None,
            sender: None,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Starts the background worker thread that drains the async request
    /// queue. Idempotent; a second call is a no-op.
    pub fn start_worker(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let (tx, rx) = flume::unbounded::<Request>();
        let state = Arc::clone(&self.state);
        let cancel = Arc::clone(&self.cancel);
        let handle = std::thread::spawn(move || worker_loop(&state, &rx, &cancel));
        self.sender = Some(tx);
        self.worker = Some(handle);
    }

    /// Requests the worker thread stop after its current request (if any);
    /// cancellation is only honored at requeue boundaries, per SPEC_FULL §4.9.
    pub fn stop_worker(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.sender.take();
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
    }

    /// Submits a read request to the async queue. Requires `start_worker`.
    pub fn submit_read(
        &self,
        mode: CoordinatorMode,
        subarray: Vec<(i64, i64)>,
        attribute_names: Vec<String>,
        predicate: Option<Arc<Predicate>>,
        max_cells_per_tile: Option<usize>,
    ) -> Result<(RequestHandle, Arc<Mutex<Option<ReadResult>>>)> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::InvalidState("async worker not started".into()))?;
        let out = Arc::new(Mutex::new(None));
        let status = Arc::new(Mutex::new(RequestStatus::InProgress));
        let (done_tx, done_rx) = flume::bounded(1);
        sender
            .send(Request {
                kind: RequestKind::Read {
                    mode,
                    subarray,
                    attribute_names,
                    predicate,
                    max_cells_per_tile,
                    out: Arc::clone(&out),
                },
                status: Arc::clone(&status),
                done: done_tx,
            })
            .map_err(|_| Error::InvalidState("async worker channel closed".into()))?;
        Ok((RequestHandle { status, done: done_rx }, out))
    }

    /// Submits a write request to the async queue. Requires `start_worker`.
    pub fn submit_write(&self, mode: CoordinatorMode, batch: CellBatch) -> Result<RequestHandle> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::InvalidState("async worker not started".into()))?;
        let status = Arc::new(Mutex::new(RequestStatus::InProgress));
        let (done_tx, done_rx) = flume::bounded(1);
        sender
            .send(Request {
                kind: RequestKind::Write { mode, batch },
                status: Arc::clone(&status),
                done: done_tx,
            })
            .map_err(|_| Error::InvalidState("async worker channel closed".into()))?;
        Ok(RequestHandle { status, done: done_rx })
    }

    /// Submits a consolidation request to the async queue. Requires
    /// `start_worker`.
    pub fn submit_consolidate(&self, batch_size: usize) -> Result<RequestHandle> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::InvalidState("async worker not started".into()))?;
        let status = Arc::new(Mutex::new(RequestStatus::InProgress));
        let (done_tx, done_rx) = flume::bounded(1);
        sender
            .send(Request {
                kind: RequestKind::Consolidate { batch_size },
                status: Arc::clone(&status),
                done: done_tx,
            })
            .map_err(|_| Error::InvalidState("async worker channel closed".into()))?;
        Ok(RequestHandle { status, done: done_rx })
    }

    /// Synchronous write, executed on the caller's thread.
    pub fn write(&self, mode: CoordinatorMode, batch: CellBatch) -> Result<String> {
        do_write(&self.state, mode, batch)
    }

    /// Synchronous read, executed on the caller's thread.
    pub fn read(
        &self,
        mode: CoordinatorMode,
        subarray: &[(i64, i64)],
        attribute_names: &[String],
        predicate: Option<&Predicate>,
        max_cells_per_tile: Option<usize>,
    ) -> Result<ReadResult> {
        do_read(&self.state, mode, subarray, attribute_names, predicate, max_cells_per_tile)
    }

    /// Synchronous consolidation, executed on the caller's thread.
    pub fn consolidate(&self, batch_size: usize) -> Result<()> {
        do_consolidate(&self.state, batch_size)
    }

    /// Currently committed fragment paths, oldest first.
    #[must_use]
    pub fn fragment_paths(&self) -> Vec<String> {
        self.state.fragments.read().clone()
    }

    /// The array's schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.state.schema
    }

    /// The backend and array directory this coordinator was opened against,
    /// for callers that need to open fragment readers directly (e.g. a CLI
    /// inspect command).
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.state.backend
    }
}

impl Drop for ArrayCoordinator {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn worker_loop(state: &Arc<State>, rx: &flume::Receiver<Request>, cancel: &Arc<AtomicBool>) {
    while let Ok(req) = rx.recv() {
        if cancel.load(Ordering::SeqCst) {
            *req.status.lock() = RequestStatus::Error("cancelled".into());
            let _ = req.done.send(());
            break;
        }
        let outcome = match req.kind {
            RequestKind::Read { mode, subarray, attribute_names, predicate, max_cells_per_tile, out } => {
                match do_read(state, mode, &subarray, &attribute_names, predicate.as_deref(), max_cells_per_tile) {
                    Ok(result) => {
                        let overflowed = result.overflowed;
                        *out.lock() = Some(result);
                        if overflowed { RequestStatus::Overflow } else { RequestStatus::Completed }
                    }
                    Err(e) => RequestStatus::Error(e.to_string()),
                }
            }
            RequestKind::Write { mode, batch } => match do_write(state, mode, batch) {
                Ok(_) => RequestStatus::Completed,
                Err(e) => RequestStatus::Error(e.to_string()),
            },
            RequestKind::Consolidate { batch_size } => match do_consolidate(state, batch_size) {
                Ok(()) => RequestStatus::Completed,
                Err(e) => RequestStatus::Error(e.to_string()),
            },
        };
        *req.status.lock() = outcome;
        let _ = req.done.send(());
    }
}

fn next_fragment_name(state: &State) -> String {
    let id = state.next_fragment_id.fetch_add(1, Ordering::SeqCst);
    format!("fragment_{id:020}")
}

fn do_write(state: &Arc<State>, mode: CoordinatorMode, batch: CellBatch) -> Result<String> {
    let write_mode = mode
        .write_mode()
        .ok_or_else(|| Error::InvalidState("coordinator is not in a write mode".into()))?;
    let name = next_fragment_name(state);
    let mut writer = FragmentWriter::new(
        Arc::clone(&state.backend),
        Arc::clone(&state.schema),
        state.config.clone(),
        &state.array_dir,
        name,
        write_mode,
    )?;
    writer.write_batch(batch)?;
    let path = writer.finalize()?;
    state.fragments.write().push(path.clone());
    debug!("coordinator committed fragment {path}");
    Ok(path)
}

fn do_read(
    state: &Arc<State>,
    mode: CoordinatorMode,
    subarray: &[(i64, i64)],
    attribute_names: &[String],
    predicate: Option<&Predicate>,
    max_cells_per_tile: Option<usize>,
) -> Result<ReadResult> {
    let mut result = ReadResult::default();
    for name in attribute_names {
        let attr = state
            .schema
            .attributes
            .iter()
            .find(|a| &a.name == name)
            .ok_or_else(|| Error::UnknownName(name.clone()))?;
        let seed = if matches!(attr.cell_val_num, crate::schema::CellValNum::Variable) {
            AttributeData::Variable { data: Vec::new(), offsets: Vec::new() }
        } else {
            AttributeData::Fixed(Vec::new())
        };
        result.attributes.insert(name.clone(), seed);
    }

    let fragments = state.fragments.read().clone();
    for fragment_path in &fragments {
        let reader = FragmentReader::open(Arc::clone(&state.backend), Arc::clone(&state.schema), fragment_path)?;
        for tile_index in reader.tiles_overlapping(subarray) {
            let tile = reader.read_tile(&state.backend, tile_index, attribute_names, max_cells_per_tile)?;
            result.overflowed |= tile.overflowed;
            let keep = keep_indices(&state.schema, &tile, predicate)?;
            let (coords, attrs) = crate::expr::compact_cells(&tile.coords, &tile.attributes, &keep);
            result.coords.extend(coords);
            for (name, data) in attrs {
                append_attribute_data(result.attributes.get_mut(&name).expect("seeded above"), &data);
            }
        }
    }

    if let Some(order) = mode.read_sort_order() {
        let perm = sort_permutation(&result.coords, order, 16)?;
        let (sorted_coords, sorted_attrs) = crate::expr::compact_cells(&result.coords, &result.attributes, &perm);
        result.coords = sorted_coords;
        result.attributes = sorted_attrs;
    }

    Ok(result)
}

/// Evaluates `predicate` (if any) against every cell in `tile`, returning
/// the indices of cells to keep.
fn keep_indices(
    schema: &Schema,
    tile: &crate::fragment::TileResult,
    predicate: Option<&Predicate>,
) -> Result<Vec<usize>> {
    let Some(predicate) = predicate else {
        return Ok((0..tile_len(tile)).collect());
    };
    let mut keep = Vec::new();
    for i in 0..tile_len(tile) {
        let coords = tile.coords.get(i).map_or(&[][..], Vec::as_slice);
        let mut attrs = std::collections::HashMap::new();
        for attr in &schema.attributes {
            if let Some(data) = tile.attributes.get(&attr.name) {
                attrs.insert(attr.name.clone(), cell_value(attr, data, i));
            }
        }
        if predicate.eval(coords, &attrs)? {
            keep.push(i);
        }
    }
    Ok(keep)
}

fn tile_len(tile: &crate::fragment::TileResult) -> usize {
    if !tile.coords.is_empty() {
        return tile.coords.len();
    }
    tile.attributes
        .values()
        .next()
        .map_or(0, |d| match d {
            AttributeData::Fixed(_) => 0,
            AttributeData::Variable { offsets, .. } => offsets.len(),
        })
}

/// Decodes the `i`-th cell of one attribute's tile data into an expression
/// `Value`, per the runtime-value rules in SPEC_FULL §4.8.
fn cell_value(attr: &crate::schema::Attribute, data: &AttributeData, i: usize) -> crate::expr::Value {
    use crate::expr::Value;
    use crate::schema::{CellType, CellValNum};

    match data {
        AttributeData::Fixed(bytes) => {
            let k = match attr.cell_val_num {
                CellValNum::Single => 1,
                CellValNum::Fixed(k) => k as usize,
                CellValNum::Variable => unreachable!(),
            };
            let elem = attr.cell_type.size();
            let start = i * k * elem;
            if attr.cell_type == CellType::Char {
                let raw = &bytes[start..start + k * elem];
                return Value::Str(String::from_utf8_lossy(raw).into_owned());
            }
            if k == 1 {
                decode_scalar(attr.cell_type, &bytes[start..start + elem])
            } else {
                Value::IntVec((0..k).map(|j| decode_i64(attr.cell_type, &bytes[start + j * elem..start + (j + 1) * elem])).collect())
            }
        }
        AttributeData::Variable { data, offsets } => {
            let elem = attr.cell_type.size();
            let start = offsets[i] as usize;
            let end = offsets.get(i + 1).copied().map_or(data.len(), |o| o as usize);
            let raw = &data[start..end];
            if attr.cell_type == CellType::Char {
                Value::Str(String::from_utf8_lossy(raw).into_owned())
            } else {
                Value::IntVec(raw.chunks_exact(elem).map(|c| decode_i64(attr.cell_type, c)).collect())
            }
        }
    }
}

fn decode_scalar(cell_type: crate::schema::CellType, bytes: &[u8]) -> crate::expr::Value {
    use crate::schema::CellType;
    match cell_type {
        CellType::Float32 => crate::expr::Value::Float(f32::from_le_bytes(bytes.try_into().expect("4 bytes")) as f64),
        CellType::Float64 => crate::expr::Value::Float(f64::from_le_bytes(bytes.try_into().expect("8 bytes"))),
        other => crate::expr::Value::Int(decode_i64(other, bytes)),
    }
}

fn decode_i64(cell_type: crate::schema::CellType, bytes: &[u8]) -> i64 {
    use crate::schema::CellType;
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    match cell_type {
        CellType::Uint8 | CellType::Uint16 | CellType::Uint32 | CellType::Uint64 => {
            u64::from_le_bytes(buf) as i64
        }
        _ => i64::from_le_bytes(buf),
    }
}

/// Consolidates fragments in batches of `batch_size`: each batch's fragments
/// are merged into one new fragment by streaming every tile of every
/// attribute across the batch into a fresh writer; on the next round the
/// merged output joins the next `batch_size` originals. After the final
/// round the original input fragments are deleted, per SPEC_FULL §4.9.
fn do_consolidate(state: &Arc<State>, batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(Error::InvalidState("consolidation batch size must be > 0".into()));
    }
    let mut remaining = state.fragments.read().clone();
    if remaining.len() <= 1 {
        return Ok(());
    }

    let mut to_delete: Vec<String> = Vec::new();
    loop {
        if remaining.len() <= batch_size {
            break;
        }
        let batch: Vec<String> = remaining.drain(0..batch_size).collect();
        let merged = consolidate_batch(state, &batch)?;
        to_delete.extend(batch);
        remaining.insert(0, merged);
        debug!("consolidation batch merged into {}", remaining[0]);
    }

    for path in &to_delete {
        state.backend.remove_dir_recursive(path).unwrap_or_else(|e| {
            warn!("failed to remove consolidated fragment {path}: {e}");
        });
    }

    *state.fragments.write() = remaining;
    Ok(())
}

fn consolidate_batch(state: &Arc<State>, batch: &[String]) -> Result<String> {
    let attribute_names: Vec<String> = state.schema.attributes.iter().map(|a| a.name.clone()).collect();
    let name = next_fragment_name(state);
    let mut writer = FragmentWriter::new(
        Arc::clone(&state.backend),
        Arc::clone(&state.schema),
        state.config.clone(),
        &state.array_dir,
        name,
        WriteMode::SparseOrdered,
    )?;

    for fragment_path in batch {
        let reader = FragmentReader::open(Arc::clone(&state.backend), Arc::clone(&state.schema), fragment_path)?;
        for tile_index in 0..reader.tile_count() {
            let tile = reader.read_tile(&state.backend, tile_index, &attribute_names, None)?;
            if let Err(e) = writer.write_batch(CellBatch { coords: tile.coords, attributes: tile.attributes }) {
                return Err(e);
            }
        }
    }

    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CompressionId;
    use crate::fragment::AttributeData;
    use crate::schema::{Attribute, CellType, CellValNum};
    use crate::storage::MemoryBackend;
    use std::collections::BTreeMap;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema {
            dimension_names: vec!["x".into(), "y".into()],
            coords_type: CellType::Int32,
            domain: vec![(0, 999), (0, 999)],
            tile_extents: None,
            attributes: vec![Attribute {
                name: "val".into(),
                cell_type: CellType::Int32,
                cell_val_num: CellValNum::Single,
                compressor: CompressionId::None,
                offsets_compressor: None,
                level: 0,
                pre_filter: crate::codec::FilterId::None,
                post_filter: crate::codec::FilterId::None,
            }],
            cell_order: CellOrder::RowMajor,
            tile_order: CellOrder::RowMajor,
            capacity: 4,
            dense: false,
            coords_compressor: CompressionId::None,
        })
    }

    fn batch(coords: Vec<Vec<i64>>) -> CellBatch {
        let mut values = Vec::new();
        for c in &coords {
            values.extend_from_slice(&(c[0] as i32).to_le_bytes());
        }
        let mut attrs = BTreeMap::new();
        attrs.insert("val".to_string(), AttributeData::Fixed(values));
        CellBatch { coords, attributes: attrs }
    }

    #[test]
    fn write_then_read_roundtrips() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let config = Config::new("/home");
        let coordinator =
            ArrayCoordinator::open(backend, schema(), config, "/array").expect("open");
        coordinator
            .write(CoordinatorMode::Write, batch((0..6).map(|i| vec![i, i]).collect()))
            .expect("write");
        let result = coordinator
            .read(CoordinatorMode::Read, &[(0, 999), (0, 999)], &["val".to_string()], None, None)
            .expect("read");
        assert_eq!(result.coords.len(), 6);
    }

    #[test]
    fn consolidate_merges_fragments() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let config = Config::new("/home");
        let coordinator =
            ArrayCoordinator::open(backend, schema(), config, "/array").expect("open");
        coordinator.write(CoordinatorMode::Write, batch(vec![vec![0, 0], vec![1, 1]])).expect("w1");
        coordinator.write(CoordinatorMode::Write, batch(vec![vec![2, 2], vec![3, 3]])).expect("w2");
        coordinator.write(CoordinatorMode::Write, batch(vec![vec![4, 4], vec![5, 5]])).expect("w3");
        assert_eq!(coordinator.fragment_paths().len(), 3);

        coordinator.consolidate(2).expect("consolidate");
        assert_eq!(coordinator.fragment_paths().len(), 1);

        let result = coordinator
            .read(CoordinatorMode::Read, &[(0, 999), (0, 999)], &["val".to_string()], None, None)
            .expect("read");
        assert_eq!(result.coords.len(), 6);
    }

    #[test]
    fn async_write_and_read_complete() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let config = Config::new("/home");
        let mut coordinator =
            ArrayCoordinator::open(backend, schema(), config, "/array").expect("open");
        coordinator.start_worker();

        let handle = coordinator
            .submit_write(CoordinatorMode::Write, batch(vec![vec![0, 0], vec![1, 1]]))
            .expect("submit write");
        assert!(matches!(handle.wait(), RequestStatus::Completed));

        let (handle, out) = coordinator
            .submit_read(
                CoordinatorMode::Read,
                vec![(0, 999), (0, 999)],
                vec!["val".to_string()],
                None,
                None,
            )
            .expect("submit read");
        assert!(matches!(handle.wait(), RequestStatus::Completed));
        assert_eq!(out.lock().as_ref().expect("read result").coords.len(), 2);
    }
}
