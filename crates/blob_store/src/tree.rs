//! Startup creation of the shard directory tree.
//!
//! Every directory a blob can land in is created up front, so uploads never
//! have to create directories on the request path.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{BlobError, BlobResult};

/// Relative paths of every leaf directory of a tree with the given depth.
///
/// Yields `10^nesting_depth` paths in ascending digit order; a depth of zero
/// yields the empty path (the root itself).
pub fn leaf_dirs(nesting_depth: u32) -> impl Iterator<Item = PathBuf> {
    let width = nesting_depth as usize;
    (0..10u64.pow(nesting_depth)).map(move |n| {
        format!("{n:0width$}")
            .chars()
            .take(width)
            .map(String::from)
            .collect::<PathBuf>()
    })
}

/// Creates the full shard tree of `nesting_depth` levels under `root`.
///
/// Existing directories are left alone, so running this against an already
/// initialized root is a no-op. Any failure is reported as
/// [`BlobError::Startup`] and must abort the process start.
pub async fn create_shard_tree(root: &Path, nesting_depth: u32) -> BlobResult<()> {
    info!(
        root = %root.display(),
        nesting_depth,
        "initializing shard tree"
    );
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|source| BlobError::Startup {
            path: root.to_path_buf(),
            source,
        })?;

    let mut created = 0u64;
    for leaf in leaf_dirs(nesting_depth) {
        let dir = root.join(leaf);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| BlobError::Startup { path: dir, source })?;
        created += 1;
    }
    debug!(leaves = created, "shard tree ready");
    Ok(())
}
