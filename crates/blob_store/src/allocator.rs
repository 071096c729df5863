//! Random identifier allocation.

use std::sync::Arc;

use rand::Rng;
use tracing::{error, trace};

use crate::{
    sharding::{BlobId, ShardLayout, ShardLocator},
    BlobError,
    BlobResult,
};

/// Draws identifiers uniformly from the layout's id space until one is found
/// with no blob on disk.
///
/// Probing reserves nothing: two callers can be handed the same free id. The
/// store closes that window by creating the blob file with exclusive-create
/// semantics and asking for a fresh id when it loses the race.
#[derive(Clone)]
pub struct IdAllocator {
    locator: ShardLocator,
    sampler: Sampler,
}

/// Draws a candidate from `[0, layout.id_space())`.
pub type Sampler = Arc<dyn Fn(&ShardLayout) -> u64 + Send + Sync>;

impl IdAllocator {
    pub fn new(locator: ShardLocator) -> Self {
        Self::with_sampler(
            locator,
            Arc::new(|layout: &ShardLayout| rand::rng().random_range(0..layout.id_space())),
        )
    }

    /// Uses `sampler` instead of the uniform random draw.
    pub fn with_sampler(locator: ShardLocator, sampler: Sampler) -> Self {
        Self { locator, sampler }
    }

    /// Whether a blob file exists for `id`.
    pub async fn exists(&self, id: BlobId) -> BlobResult<bool> {
        let path = self.locator.blob_path(id);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| BlobError::io("check blob", path, e))
    }

    /// Returns an id with no blob on disk.
    ///
    /// Keeps sampling through collisions and only fails if the existence
    /// check itself fails.
    pub async fn allocate(&self) -> BlobResult<BlobId> {
        let mut collisions = 0u64;
        loop {
            let candidate = self.sample();
            match self.exists(candidate).await {
                Ok(false) => {
                    trace!(blob_id = %candidate, collisions, "allocated blob id");
                    return Ok(candidate);
                }
                Ok(true) => collisions += 1,
                Err(e) => {
                    error!(blob_id = %candidate, error = %e, "failed to check blob id");
                    return Err(e);
                }
            }
        }
    }

    fn sample(&self) -> BlobId {
        let layout = self.locator.layout();
        // Wrap so a custom sampler can never produce an unrepresentable id.
        let value = (self.sampler)(layout) % layout.id_space();
        layout.id_unchecked(value)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::tree::create_shard_tree;

    async fn allocator(root: &std::path::Path, id_length: u32, depth: u32) -> IdAllocator {
        create_shard_tree(root, depth).await.unwrap();
        let layout = ShardLayout::new(id_length, depth).unwrap();
        IdAllocator::new(ShardLocator::new(root, layout, "mp3"))
    }

    #[tokio::test]
    async fn test_allocated_id_is_in_range_and_free() {
        let temp_dir = TempDir::new().unwrap();
        let allocator = allocator(temp_dir.path(), 5, 4).await;

        for _ in 0..50 {
            let id = allocator.allocate().await.unwrap();
            assert!(id.get() < 100_000);
            assert!(!allocator.exists(id).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_skips_taken_ids() {
        let temp_dir = TempDir::new().unwrap();
        let allocator = allocator(temp_dir.path(), 1, 1).await;

        // Occupy every id except 6.
        for n in (0..10).filter(|n| *n != 6) {
            let path = temp_dir.path().join(format!("{n}/{n}.mp3"));
            std::fs::write(path, b"taken").unwrap();
        }

        for _ in 0..20 {
            assert_eq!(allocator.allocate().await.unwrap().get(), 6);
        }
    }

    #[tokio::test]
    async fn test_custom_sampler() {
        let temp_dir = TempDir::new().unwrap();
        create_shard_tree(temp_dir.path(), 2).await.unwrap();
        let layout = ShardLayout::new(3, 2).unwrap();
        let locator = ShardLocator::new(temp_dir.path(), layout, "mp3");
        std::fs::write(temp_dir.path().join("1/2/123.mp3"), b"taken").unwrap();

        let draws = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let sampler: Sampler = {
            let draws = draws.clone();
            Arc::new(move |_: &ShardLayout| {
                let n = draws.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                // 123 is taken, then 1456 wraps around to 456.
                [123u64, 1456][n.min(1)]
            })
        };
        let allocator = IdAllocator::with_sampler(locator, sampler);

        assert_eq!(allocator.allocate().await.unwrap().get(), 456);
        assert_eq!(draws.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_existence_check_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let allocator = allocator(temp_dir.path(), 1, 1).await;

        for n in (0..10).filter(|n| *n != 3) {
            let path = temp_dir.path().join(format!("{n}/{n}.mp3"));
            std::fs::write(path, b"taken").unwrap();
        }
        // Replace the shard directory of the only free id with a plain file so
        // checking it fails with something other than "not found".
        std::fs::remove_dir(temp_dir.path().join("3")).unwrap();
        std::fs::write(temp_dir.path().join("3"), b"not a directory").unwrap();

        let result = allocator.allocate().await;
        assert!(matches!(result, Err(BlobError::Io { .. })));
    }
}
