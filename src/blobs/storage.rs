//! Blob storage implementation.

use crate::error::Result;
use crate::types::Hash;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Content-addressed storage of message bodies.
///
/// A body with hash `abcd...` lives at `<path>/ab/cd/abcd...` and the file
/// holds the raw bytes, nothing else.
pub struct BlobStorage {
    /// Base directory for blobs.
    path: PathBuf,

    /// LRU cache for recently read bodies.
    cache: Mutex<LruCache<Hash, Vec<u8>>>,
}

impl BlobStorage {
    /// Create a new blob storage at the given path.
    pub fn new(path: impl AsRef<Path>, cache_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            path,
            cache: Mutex::new(LruCache::new(cache_size)),
        })
    }

    /// Hash a body without storing it.
    pub fn hash_of(content: &[u8]) -> Hash {
        Hash::from_bytes(content)
    }

    /// Store a body, returning its hash.
    ///
    /// The file is always rewritten, so a body left short by an earlier
    /// failed write is repaired by the next store of the same content.
    pub fn store(&self, content: &[u8]) -> Result<Hash> {
        let hash = Self::hash_of(content);
        let blob_path = self.blob_path(&hash);

        if let Err(e) = Self::write_file(&blob_path, content) {
            error!(path = %blob_path.display(), error = %e, "blob write failed");
            return Err(e.into());
        }
        self.cache.lock().pop(&hash);
        debug!(%hash, len = content.len(), "blob stored");

        Ok(hash)
    }

    /// Write next to the target, then rename over it. Readers see either the
    /// old file or the complete new one.
    fn write_file(blob_path: &Path, content: &[u8]) -> std::io::Result<()> {
        if let Some(shard_dir) = blob_path.parent() {
            fs::create_dir_all(shard_dir)?;
        }
        let tmp_path = blob_path.with_extension("tmp");

        let written = File::create(&tmp_path).and_then(|mut file| {
            file.write_all(content)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&tmp_path, blob_path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        Ok(())
    }

    /// Get a body by its hash.
    pub fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        if let Some(cached) = self.cache.lock().get(hash).cloned() {
            return Ok(Some(cached));
        }

        let content = match fs::read(self.blob_path(hash)) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        self.cache.lock().put(*hash, content.clone());
        Ok(Some(content))
    }

    /// Check if a blob exists.
    pub fn exists(&self, hash: &Hash) -> bool {
        if self.cache.lock().contains(hash) {
            return true;
        }
        self.blob_path(hash).exists()
    }

    /// Full path for a blob: two shard directories, then the hex hash.
    pub fn blob_path(&self, hash: &Hash) -> PathBuf {
        let (d1, d2) = hash.shard_dirs();
        self.path.join(d1).join(d2).join(hash.to_hex())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
