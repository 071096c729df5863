//! Blob storage configuration.

use std::{env, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{sharding::ShardLayout, BlobError, BlobResult};

/// Reference transfer chunk size for downloads.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Configuration for blob storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStorageConfig {
    /// Root directory of the shard tree.
    #[serde(default = "default_blob_store_path")]
    pub path: String,

    /// Number of directory levels, one per leading digit.
    #[serde(default = "default_nesting_depth")]
    pub nesting_depth: u32,

    /// Maximum number of decimal digits in a blob id.
    #[serde(default = "default_id_length")]
    pub id_length: u32,

    /// Extension given to every blob file, regardless of content.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Size of the chunks a download is split into.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for BlobStorageConfig {
    fn default() -> Self {
        Self {
            path: default_blob_store_path(),
            nesting_depth: default_nesting_depth(),
            id_length: default_id_length(),
            extension: default_extension(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl BlobStorageConfig {
    pub fn new(path: impl Into<String>, nesting_depth: u32, id_length: u32) -> Self {
        Self {
            path: path.into(),
            nesting_depth,
            id_length,
            ..Default::default()
        }
    }

    pub fn layout(&self) -> BlobResult<ShardLayout> {
        ShardLayout::new(self.id_length, self.nesting_depth)
    }

    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    pub fn validate(&self) -> BlobResult<()> {
        self.layout()?;
        if self.path.is_empty() {
            return Err(BlobError::InvalidConfig {
                reason: "path cannot be empty".to_string(),
            });
        }
        if self.chunk_size == 0 {
            return Err(BlobError::InvalidConfig {
                reason: "chunk_size must be greater than zero".to_string(),
            });
        }
        if self.extension.is_empty() || self.extension.contains(['/', '.']) {
            return Err(BlobError::InvalidConfig {
                reason: format!("invalid blob file extension: {:?}", self.extension),
            });
        }
        Ok(())
    }
}

/// Default blob store path (`storage/blobs` under the working directory).
pub fn default_blob_store_path() -> String {
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("storage/blobs")
        .to_str()
        .unwrap_or("./storage/blobs")
        .to_string()
}

fn default_nesting_depth() -> u32 {
    4
}

fn default_id_length() -> u32 {
    9
}

fn default_extension() -> String {
    "mp3".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
