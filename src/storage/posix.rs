use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::Backend;
use crate::error::Result;

/// A local-filesystem backend rooted at a directory.
///
/// Honors `keep_write_file_handles_open`: when enabled, write handles are
/// cached in `open_writers` rather than opened and closed on every append,
/// grounded on the teacher's `backend_mmap.rs` pattern of owning one handle
/// per backend instance, generalized to a per-path map here since a fragment
/// writer touches many attribute files concurrently.
pub struct PosixBackend {
    root: PathBuf,
    keep_handles_open: bool,
    open_writers: Mutex<HashMap<String, File>>,
}

impl PosixBackend {
    /// Opens (creating if necessary) a backend rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, keep_handles_open: bool) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            keep_handles_open,
            open_writers: Mutex::new(HashMap::new()),
        })
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl Backend for PosixBackend {
    fn exists_dir(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path).is_dir())
    }

    fn exists_file(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path).is_file())
    }

    fn list_dirs(&self, path: &str) -> Result<Vec<String>> {
        list_entries(&self.full_path(path), |m| m.is_dir())
    }

    fn list_files(&self, path: &str) -> Result<Vec<String>> {
        list_entries(&self.full_path(path), |m| m.is_file())
    }

    fn mkdir_all(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.full_path(path))?;
        Ok(())
    }

    fn remove_dir_recursive(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        if full.exists() {
            fs::remove_dir_all(full)?;
        }
        Ok(())
    }

    fn create_empty_file(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(full)?;
        Ok(())
    }

    fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = File::open(self.full_path(path))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn append_write(&self, path: &str, buf: &[u8]) -> Result<()> {
        if self.keep_handles_open {
            let mut guard = self.open_writers.lock();
            let file = match guard.get_mut(path) {
                Some(f) => f,
                None => {
                    let full = self.full_path(path);
                    if let Some(parent) = full.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let f = OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(full)?;
                    guard.insert(path.to_string(), f);
                    guard.get_mut(path).expect("just inserted")
                }
            };
            file.write_all(buf)?;
        } else {
            let full = self.full_path(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(full)?;
            file.write_all(buf)?;
        }
        Ok(())
    }

    fn size(&self, path: &str) -> Result<u64> {
        Ok(fs::metadata(self.full_path(path))?.len())
    }

    fn sync(&self, path: &str) -> Result<()> {
        if let Some(file) = self.open_writers.lock().get(path) {
            file.sync_all()?;
            return Ok(());
        }
        let full = self.full_path(path);
        if full.exists() {
            File::open(full)?.sync_all()?;
        }
        Ok(())
    }

    fn rename(&self, old: &str, new: &str) -> Result<()> {
        let new_full = self.full_path(new);
        if let Some(parent) = new_full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(self.full_path(old), new_full)?;
        Ok(())
    }

    fn close(&self, path: &str) -> Result<()> {
        self.open_writers.lock().remove(path);
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        if full.exists() {
            fs::remove_file(full)?;
        }
        Ok(())
    }
}

fn list_entries(dir: &Path, keep: impl Fn(&fs::Metadata) -> bool) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if keep(&meta) {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = PosixBackend::new(dir.path(), false).expect("backend");
        backend.append_write("a.dat", b"hello ").expect("append1");
        backend.append_write("a.dat", b"world").expect("append2");
        assert_eq!(backend.size("a.dat").expect("size"), 11);
        let mut buf = [0u8; 5];
        backend.read_at("a.dat", 6, &mut buf).expect("read");
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn rename_commits_fragment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = PosixBackend::new(dir.path(), false).expect("backend");
        backend.mkdir_all(".frag").expect("mkdir");
        backend.create_empty_file(".frag/__fragment.ok").expect("sentinel");
        backend.rename(".frag", "frag").expect("rename");
        assert!(backend.exists_dir("frag").expect("exists"));
        assert!(!backend.exists_dir(".frag").expect("exists"));
    }

    #[test]
    fn keep_handles_open_accumulates_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = PosixBackend::new(dir.path(), true).expect("backend");
        backend.append_write("b.dat", b"12").expect("append1");
        backend.append_write("b.dat", b"34").expect("append2");
        backend.close("b.dat").expect("close");
        assert_eq!(backend.size("b.dat").expect("size"), 4);
    }
}
