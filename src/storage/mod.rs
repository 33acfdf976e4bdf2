//! The narrow filesystem-like interface the rest of the crate is built on.
//!
//! Only `read_at`/`append_write` and directory/file bookkeeping calls cross
//! this boundary; everything above it (the chunked storage buffer, codec
//! pipeline, fragment writer/reader) is backend-agnostic. This mirrors the
//! teacher's own backend-trait-first design (`backend_mmap.rs`,
//! `backend_http.rs`), narrowed to the operations this engine actually needs
//! and made synchronous per the coordinator's single-worker-thread model
//! (see `DESIGN.md`).

mod memory;
mod posix;

pub use memory::MemoryBackend;
pub use posix::PosixBackend;

use crate::error::{Error, Result};

/// A filesystem-like storage backend.
///
/// Implementations need not be thread-safe across multiple writers to the
/// same path; the engine serializes writes to a given fragment through a
/// single coordinator.
pub trait Backend: Send + Sync {
    /// True if `path` names an existing directory.
    fn exists_dir(&self, path: &str) -> Result<bool>;
    /// True if `path` names an existing file.
    fn exists_file(&self, path: &str) -> Result<bool>;
    /// Lists the immediate subdirectories of `path`.
    fn list_dirs(&self, path: &str) -> Result<Vec<String>>;
    /// Lists the immediate files of `path`.
    fn list_files(&self, path: &str) -> Result<Vec<String>>;
    /// Creates `path` and any missing parent directories.
    fn mkdir_all(&self, path: &str) -> Result<()>;
    /// Recursively removes a directory and its contents.
    fn remove_dir_recursive(&self, path: &str) -> Result<()>;
    /// Creates an empty file at `path`, truncating any existing contents.
    fn create_empty_file(&self, path: &str) -> Result<()>;
    /// Reads `buf.len()` bytes starting at `offset` into `buf`.
    fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<()>;
    /// Appends `buf` to the file at `path`, creating it if necessary.
    fn append_write(&self, path: &str, buf: &[u8]) -> Result<()>;
    /// Returns the current size of the file at `path`.
    fn size(&self, path: &str) -> Result<u64>;
    /// Flushes any buffered writes to durable storage.
    fn sync(&self, path: &str) -> Result<()>;
    /// Atomically (where the backend supports it) renames `old` to `new`.
    fn rename(&self, old: &str, new: &str) -> Result<()>;
    /// Closes any cached file handle for `path`. A no-op if none is held.
    fn close(&self, path: &str) -> Result<()>;
    /// Deletes the file at `path`.
    fn remove_file(&self, path: &str) -> Result<()>;

    /// Preferred chunk size for writes; 0 means "no chunking required".
    fn upload_chunk_size(&self) -> usize {
        0
    }
    /// Preferred chunk size for reads; 0 means "no chunking required".
    fn download_chunk_size(&self) -> usize {
        0
    }
}

pub(crate) fn not_found(path: &str) -> Error {
    Error::NotFound(path.to_string())
}
