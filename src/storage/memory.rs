use std::collections::HashMap;

use parking_lot::Mutex;

use super::{not_found, Backend};
use crate::error::Result;

/// An in-memory backend used by tests in place of a temp directory, grounded
/// on the teacher's practice of exercising backend-trait logic against a
/// constructed backend rather than always touching real files
/// (`async_reader.rs`'s test module).
#[derive(Default)]
pub struct MemoryBackend {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn dir_prefix(path: &str) -> String {
        if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        }
    }
}

impl Backend for MemoryBackend {
    fn exists_dir(&self, path: &str) -> Result<bool> {
        let prefix = Self::dir_prefix(path);
        Ok(self.files.lock().keys().any(|k| k.starts_with(&prefix)))
    }

    fn exists_file(&self, path: &str) -> Result<bool> {
        Ok(self.files.lock().contains_key(path))
    }

    fn list_dirs(&self, path: &str) -> Result<Vec<String>> {
        let prefix = Self::dir_prefix(path);
        let mut dirs: Vec<String> = self
            .files
            .lock()
            .keys()
            .filter_map(|k| {
                let rest = k.strip_prefix(&prefix)?;
                let first = rest.split('/').next()?;
                rest.contains('/').then(|| first.to_string())
            })
            .collect();
        dirs.sort();
        dirs.dedup();
        Ok(dirs)
    }

    fn list_files(&self, path: &str) -> Result<Vec<String>> {
        let prefix = Self::dir_prefix(path);
        let mut files: Vec<String> = self
            .files
            .lock()
            .keys()
            .filter_map(|k| {
                let rest = k.strip_prefix(&prefix)?;
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn mkdir_all(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn remove_dir_recursive(&self, path: &str) -> Result<()> {
        let prefix = Self::dir_prefix(path);
        self.files.lock().retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    fn create_empty_file(&self, path: &str) -> Result<()> {
        self.files.lock().insert(path.to_string(), Vec::new());
        Ok(())
    }

    fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<()> {
        let files = self.files.lock();
        let data = files.get(path).ok_or_else(|| not_found(path))?;
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(crate::error::Error::UnexpectedEof);
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn append_write(&self, path: &str, buf: &[u8]) -> Result<()> {
        self.files
            .lock()
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(buf);
        Ok(())
    }

    fn size(&self, path: &str) -> Result<u64> {
        Ok(self
            .files
            .lock()
            .get(path)
            .map_or(0, |d| d.len() as u64))
    }

    fn sync(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn rename(&self, old: &str, new: &str) -> Result<()> {
        let mut files = self.files.lock();
        let old_prefix = Self::dir_prefix(old);
        let keys: Vec<String> = files
            .keys()
            .filter(|k| *k == old || k.starts_with(&old_prefix))
            .cloned()
            .collect();
        if keys.is_empty() {
            return Err(not_found(old));
        }
        for k in keys {
            if let Some(data) = files.remove(&k) {
                let suffix = k.strip_prefix(old).unwrap_or(&k);
                files.insert(format!("{new}{suffix}"), data);
            }
        }
        Ok(())
    }

    fn close(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        self.files.lock().remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_moves_directory_contents() {
        let backend = MemoryBackend::new();
        backend.append_write(".frag/a.dat", b"x").expect("append");
        backend.create_empty_file(".frag/__fragment.ok").expect("sentinel");
        backend.rename(".frag", "frag").expect("rename");
        assert!(backend.exists_file("frag/a.dat").expect("exists"));
        assert!(backend.exists_file("frag/__fragment.ok").expect("exists"));
        assert!(!backend.exists_file(".frag/a.dat").expect("exists"));
    }
}
