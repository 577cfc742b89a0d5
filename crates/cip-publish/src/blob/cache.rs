//! Content-addressed on-disk blob cache
//!
//! Blobs are stored under `<cache_dir>/blobs/<first-2-hex>/<full-hex>`.
//! Because the filename is the digest, presence on disk is the whole index;
//! no separate database is needed. Writes go to a temp file in the same
//! directory and are renamed into place, so a crash never leaves a partial
//! blob under its final name.

use crate::error::Result;
use cip_common::ContentDigest;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk cache of already-published blobs
pub struct BlobCache {
    root: PathBuf,
}

impl BlobCache {
    /// Open (creating if needed) a cache rooted at `cache_dir`
    pub fn open(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let root = cache_dir.into().join("blobs");
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, digest: &ContentDigest) -> PathBuf {
        let hex = digest.hex();
        self.root.join(&hex[..2]).join(hex)
    }

    /// Whether a blob with this digest has been cached
    pub fn contains(&self, digest: &ContentDigest) -> bool {
        self.path_for(digest).is_file()
    }

    /// Store blob bytes under their digest
    pub fn store(&self, digest: &ContentDigest, data: &[u8]) -> Result<()> {
        let path = self.path_for(digest);
        if path.is_file() {
            return Ok(());
        }
        let parent = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;

        let tmp = parent.join(format!(".{}.tmp", digest.hex()));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;

        debug!(digest = %digest, bytes = data.len(), "Cached blob");
        Ok(())
    }

    /// Load cached blob bytes, if present
    pub fn load(&self, digest: &ContentDigest) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(digest);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }
}
