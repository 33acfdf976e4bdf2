//! Engine-wide configuration. Populated via builder methods and, where noted,
//! overridable by environment variables read once at construction — mirroring
//! the way the teacher format reads feature flags from the environment rather
//! than a config file.

use std::env;

/// How a fragment's attribute files are accessed on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMethod {
    /// Stream reads through the chunked storage buffer (default).
    #[default]
    StreamRead,
    /// Memory-map the file (only meaningful for local-filesystem backends).
    MemoryMapped,
}

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root path for internal metadata (schema, fragment directories).
    pub home: String,
    /// Read strategy for attribute files.
    pub read_method: ReadMethod,
    /// Disables advisory file locking; some backends do not support it.
    pub disable_file_locking: bool,
    /// Keeps write file descriptors open across appends instead of
    /// closing after each flush.
    pub keep_write_file_handles_open: bool,
    /// Enables optimizations valid only when all writers share one
    /// POSIX filesystem (e.g. skipping remote-rename emulation).
    pub enable_shared_posixfs_optimizations: bool,
    /// Chunk size, in bytes, used by the write-mode storage buffer.
    pub upload_buffer_size: usize,
    /// Chunk size, in bytes, used by the read-mode storage buffer.
    pub download_buffer_size: usize,
    /// Per-attribute buffer budget during consolidation.
    pub consolidation_buffer_size: usize,
    /// Per-attribute buffer budget for the sorted-read overlay (fixed part).
    pub sorted_buffer_size: usize,
    /// Per-attribute buffer budget for the sorted-read overlay (variable part).
    pub sorted_buffer_var_size: usize,
    /// Maximum length, in bytes, of an array, attribute, or dimension name.
    pub name_max_len: usize,
}

const DEFAULT_UPLOAD_BUFFER: usize = 5 * 1024 * 1024;
const DEFAULT_DOWNLOAD_BUFFER: usize = 5 * 1024 * 1024;
const DEFAULT_CONSOLIDATION_BUFFER: usize = 10 * 1024 * 1024;
const DEFAULT_SORTED_BUFFER: usize = 10 * 1024 * 1024;
const DEFAULT_NAME_MAX_LEN: usize = 4096;

impl Config {
    /// Builds a configuration rooted at `home`, applying environment
    /// overrides (`CELLSTORE_DISABLE_FILE_LOCKING`, `CELLSTORE_KEEP_FILE_HANDLES_OPEN`).
    #[must_use]
    pub fn new(home: impl Into<String>) -> Self {
        let mut cfg = Self {
            home: home.into(),
            read_method: ReadMethod::StreamRead,
            disable_file_locking: false,
            keep_write_file_handles_open: false,
            enable_shared_posixfs_optimizations: false,
            upload_buffer_size: DEFAULT_UPLOAD_BUFFER,
            download_buffer_size: DEFAULT_DOWNLOAD_BUFFER,
            consolidation_buffer_size: DEFAULT_CONSOLIDATION_BUFFER,
            sorted_buffer_size: DEFAULT_SORTED_BUFFER,
            sorted_buffer_var_size: DEFAULT_SORTED_BUFFER,
            name_max_len: DEFAULT_NAME_MAX_LEN,
        };
        cfg.apply_env();
        cfg
    }

    fn apply_env(&mut self) {
        if env_flag("CELLSTORE_DISABLE_FILE_LOCKING") {
            self.disable_file_locking = true;
        }
        if env_flag("CELLSTORE_KEEP_FILE_HANDLES_OPEN") {
            self.keep_write_file_handles_open = true;
        }
    }

    /// Sets the read method.
    #[must_use]
    pub fn read_method(mut self, method: ReadMethod) -> Self {
        self.read_method = method;
        self
    }

    /// Sets the upload chunk size.
    #[must_use]
    pub fn upload_buffer_size(mut self, size: usize) -> Self {
        self.upload_buffer_size = size;
        self
    }

    /// Sets the download chunk size.
    #[must_use]
    pub fn download_buffer_size(mut self, size: usize) -> Self {
        self.download_buffer_size = size;
        self
    }

    /// Sets the consolidation per-attribute buffer budget.
    #[must_use]
    pub fn consolidation_buffer_size(mut self, size: usize) -> Self {
        self.consolidation_buffer_size = size;
        self
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::{Config, ReadMethod};

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::new("/tmp/array-home");
        assert_eq!(cfg.read_method, ReadMethod::StreamRead);
        assert!(!cfg.disable_file_locking);
        assert_eq!(cfg.name_max_len, 4096);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = Config::new("/tmp/home")
            .read_method(ReadMethod::MemoryMapped)
            .upload_buffer_size(1024);
        assert_eq!(cfg.read_method, ReadMethod::MemoryMapped);
        assert_eq!(cfg.upload_buffer_size, 1024);
    }
}
