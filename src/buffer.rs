//! The chunked storage buffer: coalesces small appends into chunk-sized
//! backend writes, and serves chunk-aligned windows on read. Grounded on the
//! teacher's `writer.rs`, which wraps its output in `countio::Counter` to
//! track bytes written without a second pass, and on its
//! `write_compressed_to`/`compressed_size` pair for the gzip overlay used by
//! small book-keeping files.

use std::io::{self, Read, Write};
use std::sync::Arc;

use countio::Counter;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;

use crate::error::Result;
use crate::storage::Backend;

/// Default chunk size used when a backend reports no preference.
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Write-mode chunked buffer. Accepts arbitrary-length appends and issues
/// exactly-chunk-sized backend writes, except for the final flush.
pub struct WriteBuffer {
    backend: Arc<dyn Backend>,
    path: String,
    chunk_size: usize,
    pending: Vec<u8>,
    written: Counter<io::Sink>,
}

impl WriteBuffer {
    /// Opens a write buffer over `path`, using the backend's preferred
    /// upload chunk size (or `DEFAULT_CHUNK_SIZE` if the backend has none).
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, path: impl Into<String>) -> Self {
        let chunk_size = match backend.upload_chunk_size() {
            0 => DEFAULT_CHUNK_SIZE,
            n => n,
        };
        Self::with_chunk_size(backend, path, chunk_size)
    }

    /// Opens a write buffer using an explicit chunk size, overriding the
    /// backend's preference. Used where `Config::upload_buffer_size` should
    /// take precedence.
    #[must_use]
    pub fn with_chunk_size(
        backend: Arc<dyn Backend>,
        path: impl Into<String>,
        chunk_size: usize,
    ) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            backend,
            path: path.into(),
            chunk_size,
            pending: Vec::with_capacity(chunk_size),
            written: Counter::new(io::sink()),
        }
    }

    /// Appends `data`, flushing full chunks to the backend as they fill.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(data);
        while self.pending.len() >= self.chunk_size {
            let chunk: Vec<u8> = self.pending.drain(..self.chunk_size).collect();
            self.flush_chunk(&chunk)?;
        }
        Ok(())
    }

    fn flush_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.backend.append_write(&self.path, chunk)?;
        self.written.write_all(chunk).expect("sink write cannot fail");
        Ok(())
    }

    /// Number of bytes handed to `append` so far (including unflushed bytes).
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.written.writer_bytes() as u64 + self.pending.len() as u64
    }

    /// Flushes remaining bytes (which may be smaller than a full chunk) and
    /// closes the backend handle. Idempotent.
    pub fn finalize(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            let chunk = std::mem::take(&mut self.pending);
            self.flush_chunk(&chunk)?;
        }
        self.backend.sync(&self.path)?;
        self.backend.close(&self.path)?;
        Ok(())
    }
}

/// Read-mode chunked buffer over an existing file. Reloads a chunk-aligned
/// window whenever a request falls outside the cached range.
pub struct ReadBuffer {
    backend: Arc<dyn Backend>,
    path: String,
    chunk_size: usize,
    file_size: u64,
    window_start: u64,
    window: Vec<u8>,
    cursor: u64,
}

impl ReadBuffer {
    /// Opens a read buffer over `path`, querying its size once.
    pub fn new(backend: Arc<dyn Backend>, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let chunk_size = match backend.download_chunk_size() {
            0 => DEFAULT_CHUNK_SIZE,
            n => n,
        };
        let file_size = backend.size(&path)?;
        Ok(Self {
            backend,
            path,
            chunk_size,
            file_size,
            window_start: 0,
            window: Vec::new(),
            cursor: 0,
        })
    }

    /// Total size of the underlying file.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.file_size
    }

    /// True if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file_size == 0
    }

    /// True if the implicit cursor has reached the end of the file.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.cursor >= self.file_size
    }

    /// Reads exactly `buf.len()` bytes at `offset`, reloading the cached
    /// window if necessary.
    pub fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset + buf.len() as u64;
        if end > self.file_size {
            return Err(crate::error::Error::UnexpectedEof);
        }
        let window_end = self.window_start + self.window.len() as u64;
        if self.window.is_empty() || offset < self.window_start || end > window_end {
            self.reload_window(offset, buf.len())?;
        }
        let rel_start = (offset - self.window_start) as usize;
        buf.copy_from_slice(&self.window[rel_start..rel_start + buf.len()]);
        Ok(())
    }

    /// Reads the next `buf.len()` bytes from the implicit cursor and
    /// advances it.
    pub fn read_next(&mut self, buf: &mut [u8]) -> Result<()> {
        let offset = self.cursor;
        self.read(offset, buf)?;
        self.cursor += buf.len() as u64;
        Ok(())
    }

    fn reload_window(&mut self, offset: u64, min_len: usize) -> Result<()> {
        let span = (min_len as u64).max(self.chunk_size as u64);
        let remaining = self.file_size - offset;
        let len = span.min(remaining) as usize;
        let mut buf = vec![0u8; len];
        self.backend.read_at(&self.path, offset, &mut buf)?;
        self.window_start = offset;
        self.window = buf;
        Ok(())
    }
}

/// Compresses `data` with gzip and writes it to `path` via `backend`. Used
/// for the (small) book-keeping and schema files, which are wrapped whole
/// rather than chunked tile-by-tile.
pub fn write_gzip(backend: &dyn Backend, path: &str, data: &[u8]) -> Result<()> {
    let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;
    backend.create_empty_file(path)?;
    backend.append_write(path, &compressed)?;
    backend.sync(path)?;
    backend.close(path)?;
    Ok(())
}

/// Reads and fully gzip-decompresses the file at `path`.
pub fn read_gzip(backend: &dyn Backend, path: &str) -> Result<Vec<u8>> {
    let size = backend.size(path)?;
    let mut compressed = vec![0u8; size as usize];
    backend.read_at(path, 0, &mut compressed)?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    #[test]
    fn write_buffer_chunks_and_flushes_remainder() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let mut w = WriteBuffer::new(backend.clone(), "a.dat");
        // force a tiny chunk size for the test by writing more than default once finalized
        w.append(&[1, 2, 3, 4, 5]).expect("append");
        w.finalize().expect("finalize");
        assert_eq!(backend.size("a.dat").expect("size"), 5);
    }

    #[test]
    fn read_buffer_serves_offsets_across_reloads() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let data: Vec<u8> = (0u8..=255).collect();
        backend.append_write("b.dat", &data).expect("append");
        let mut r = ReadBuffer::new(backend, "b.dat").expect("open");
        let mut buf = [0u8; 4];
        r.read(0, &mut buf).expect("read1");
        assert_eq!(buf, [0, 1, 2, 3]);
        r.read(252, &mut buf).expect("read2");
        assert_eq!(buf, [252, 253, 254, 255]);
    }

    #[test]
    fn gzip_roundtrip() {
        let backend = MemoryBackend::new();
        write_gzip(&backend, "meta.gz", b"hello bookkeeping").expect("write");
        let out = read_gzip(&backend, "meta.gz").expect("read");
        assert_eq!(out, b"hello bookkeeping");
    }
}
