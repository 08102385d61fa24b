//! Blob sizes, and the cache which remembers them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::OnceCell;

use crate::digest::Digest;
use crate::error::Error;

/// Somewhere the size of a blob can be looked up.
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Ask for the size of a blob, in bytes.
    async fn blob_size(&self, digest: &Digest) -> Result<u64, Error>;
}

/// Sizes of blobs, keyed by digest.
///
/// Digests name immutable content, so an entry is never invalidated and one cache can be
/// shared by every repository and every registry client. Cloning the cache is cheap and
/// the clones share their entries.
#[derive(Debug, Clone, Default)]
pub struct BlobSizeCache {
    entries: Arc<RwLock<HashMap<Digest, Arc<OnceCell<u64>>>>>,
}

impl BlobSizeCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded size of a blob, without asking anyone.
    pub fn get(&self, digest: &Digest) -> Option<u64> {
        self.entries
            .read()
            .get(digest)
            .and_then(|cell| cell.get().copied())
    }

    /// Number of recorded sizes.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    /// True when no size has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The size of a blob, asking `source` only when it is not yet known.
    ///
    /// Concurrent callers asking for the same digest share a single lookup. A lookup which
    /// fails, or is dropped, records nothing and the next caller asks again.
    pub async fn size_of<S>(&self, source: &S, digest: &Digest) -> Result<u64, Error>
    where
        S: BlobSource + ?Sized,
    {
        let cell = self.entries.read().get(digest).cloned();
        let cell = match cell {
            Some(cell) => cell,
            None => self
                .entries
                .write()
                .entry(digest.clone())
                .or_default()
                .clone(),
        };

        if let Some(size) = cell.get() {
            tracing::trace!(%digest, size, "blob size cache hit");
            return Ok(*size);
        }

        let size = cell
            .get_or_try_init(|| async move {
                tracing::debug!(%digest, "probing blob size");
                source.blob_size(digest).await
            })
            .await?;

        Ok(*size)
    }
}
