//! Byte storage backends.
//!
//! Callers never see paths: a [`BlobStore`] maps an opaque name (a single
//! path component such as `orders.city.sketch`) to bytes. [`FileBlobStore`]
//! keeps one file per name under a root directory; [`MemoryBlobStore`] keeps
//! everything in a map. Other backends (key-value, object stores) plug in
//! behind the same trait.

use crate::error::{Result, SketchError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Trait for blob storage backends.
///
/// Implementations must make `put` atomic with respect to `get`: a reader
/// sees either the previous blob or the new one, never a partial write.
pub trait BlobStore: Send + Sync {
    /// Store a blob under `name`, replacing any previous blob.
    fn put(&self, name: &str, blob: &[u8]) -> Result<()>;

    /// `Ok(Some(blob))` if found, `Ok(None)` if not found.
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a blob; deleting a missing blob is not an error.
    fn delete(&self, name: &str) -> Result<()>;

    /// Store a blob only if `name` is free; `Ok(false)` if it already exists.
    ///
    /// The default is check-then-put and is only as atomic as the caller's
    /// own locking. Backends shared between processes override it.
    fn put_if_absent(&self, name: &str, blob: &[u8]) -> Result<bool> {
        if self.exists(name)? {
            return Ok(false);
        }
        self.put(name, blob)?;
        Ok(true)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        self.get(name).map(|opt| opt.is_some())
    }

    /// Names ending in `suffix`, sorted.
    fn list(&self, suffix: &str) -> Result<Vec<String>>;
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control)
    {
        return Err(SketchError::Validation(format!(
            "invalid blob name {name:?}"
        )));
    }
    Ok(())
}

/// File-based blob storage: `<root>/<name>`.
///
/// Writes go to a uniquely named temp file in the same directory and are
/// renamed into place, so readers never observe a torn blob. No-replace
/// writes hard-link the temp file instead of renaming it, which fails if the
/// target exists even when another process created it.
#[derive(Debug)]
pub struct FileBlobStore {
    root: PathBuf,
    temp_counter: AtomicU64,
}

const TEMP_SUFFIX: &str = ".tmp";

impl FileBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `name`.
    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Write `blob` to a fresh temp file next to its final location.
    fn write_temp(&self, name: &str, blob: &[u8]) -> Result<PathBuf> {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp_path = self
            .root
            .join(format!(".{name}.{}.{n}{TEMP_SUFFIX}", std::process::id()));
        std::fs::write(&temp_path, blob)?;
        Ok(temp_path)
    }
}

impl BlobStore for FileBlobStore {
    fn put(&self, name: &str, blob: &[u8]) -> Result<()> {
        let path = self.path_of(name)?;
        let temp_path = self.write_temp(name, blob)?;
        if let Err(e) = std::fs::rename(&temp_path, &path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    fn put_if_absent(&self, name: &str, blob: &[u8]) -> Result<bool> {
        let path = self.path_of(name)?;
        let temp_path = self.write_temp(name, blob)?;
        let linked = std::fs::hard_link(&temp_path, &path);
        let _ = std::fs::remove_file(&temp_path);
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_of(name)?;
        match std::fs::read(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_of(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, name: &str) -> Result<bool> {
        match std::fs::metadata(self.path_of(name)?) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, suffix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(suffix) && !name.ends_with(TEMP_SUFFIX) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// In-memory blob storage.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, name: &str, blob: &[u8]) -> Result<()> {
        validate_name(name)?;
        let mut blobs = match self.blobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("memory blob store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        blobs.insert(name.to_string(), blob.to_vec());
        Ok(())
    }

    fn put_if_absent(&self, name: &str, blob: &[u8]) -> Result<bool> {
        validate_name(name)?;
        let mut blobs = match self.blobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if blobs.contains_key(name) {
            return Ok(false);
        }
        blobs.insert(name.to_string(), blob.to_vec());
        Ok(true)
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        validate_name(name)?;
        let blobs = match self.blobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(blobs.get(name).cloned())
    }

    fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut blobs = match self.blobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        blobs.remove(name);
        Ok(())
    }

    fn list(&self, suffix: &str) -> Result<Vec<String>> {
        let blobs = match self.blobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<String> = blobs
            .keys()
            .filter(|name| name.ends_with(suffix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}
