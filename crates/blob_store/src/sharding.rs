//! Digit-based directory sharding for numeric blob identifiers.
//!
//! An identifier is zero-padded to `id_length` digits and its leading
//! `nesting_depth` digits name the directories it lives under, one digit per
//! level. The leaf file is named after the unpadded identifier, so
//! `id_length = 5, nesting_depth = 4` places blob `10` at `0/0/0/1/10.<ext>`.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{BlobError, BlobResult};

/// Widest identifier supported; `10^18` still fits in an `i64`.
pub const MAX_ID_LENGTH: u32 = 18;

/// Deepest shard tree supported. The tree has `10^nesting_depth` leaves.
pub const MAX_NESTING_DEPTH: u32 = 6;

/// A validated blob identifier, always below `10^id_length` of the layout
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId(u64);

impl BlobId {
    pub fn get(self) -> u64 {
        self.0
    }

    /// Wire representation. Lossless because ids are capped at 18 digits.
    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier width and directory depth, fixed for the lifetime of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardLayout {
    id_length: u32,
    nesting_depth: u32,
}

impl ShardLayout {
    pub fn new(id_length: u32, nesting_depth: u32) -> BlobResult<Self> {
        if id_length == 0 || id_length > MAX_ID_LENGTH {
            return Err(BlobError::InvalidConfig {
                reason: format!("id_length must be between 1 and {MAX_ID_LENGTH}, got {id_length}"),
            });
        }
        if nesting_depth > MAX_NESTING_DEPTH {
            return Err(BlobError::InvalidConfig {
                reason: format!(
                    "nesting_depth must be at most {MAX_NESTING_DEPTH}, got {nesting_depth}"
                ),
            });
        }
        if nesting_depth > id_length {
            return Err(BlobError::InvalidConfig {
                reason: format!(
                    "nesting_depth ({nesting_depth}) cannot exceed id_length ({id_length})"
                ),
            });
        }
        Ok(Self {
            id_length,
            nesting_depth,
        })
    }

    pub fn id_length(&self) -> u32 {
        self.id_length
    }

    pub fn nesting_depth(&self) -> u32 {
        self.nesting_depth
    }

    /// Number of distinct identifiers, `10^id_length`.
    pub fn id_space(&self) -> u64 {
        10u64.pow(self.id_length)
    }

    /// Checks that `id` is representable in this layout.
    pub fn validate_id(&self, id: i64) -> BlobResult<BlobId> {
        if id < 0 {
            return Err(BlobError::InvalidIdentifier {
                id,
                reason: "id must not be negative".to_string(),
            });
        }
        let value = id as u64;
        if value >= self.id_space() {
            return Err(BlobError::InvalidIdentifier {
                id,
                reason: format!("id is wider than {} digits", self.id_length),
            });
        }
        Ok(BlobId(value))
    }

    /// Wraps an already range-checked value, e.g. one drawn from `id_space()`.
    pub(crate) fn id_unchecked(&self, value: u64) -> BlobId {
        debug_assert!(value < self.id_space());
        BlobId(value)
    }

    fn padded(&self, id: BlobId) -> String {
        format!("{:0width$}", id.0, width = self.id_length as usize)
    }

    /// Directory segments for a validated id.
    pub fn segments(&self, id: BlobId) -> Vec<String> {
        self.padded(id)
            .chars()
            .take(self.nesting_depth as usize)
            .map(String::from)
            .collect()
    }

    /// Validates `id` and returns its directory segments.
    pub fn shard_path(&self, id: i64) -> BlobResult<Vec<String>> {
        Ok(self.segments(self.validate_id(id)?))
    }

    /// Path of the blob file relative to the store root.
    pub fn relative_path(&self, id: BlobId, extension: &str) -> PathBuf {
        let mut path: PathBuf = self.segments(id).into_iter().collect();
        path.push(file_name(id, extension));
        path
    }
}

/// Resolves identifiers to absolute blob paths under a store root.
#[derive(Debug, Clone)]
pub struct ShardLocator {
    root: PathBuf,
    layout: ShardLayout,
    extension: String,
}

impl ShardLocator {
    pub fn new(root: impl Into<PathBuf>, layout: ShardLayout, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            layout,
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &ShardLayout {
        &self.layout
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn blob_path(&self, id: BlobId) -> PathBuf {
        self.root.join(self.layout.relative_path(id, &self.extension))
    }
}

/// Leaf file name: the unpadded id plus the store's fixed extension.
pub fn file_name(id: BlobId, extension: &str) -> String {
    format!("{id}.{extension}")
}

/// Directory segments for `id` under the given layout parameters.
///
/// Fails with [`BlobError::InvalidIdentifier`] when `id` is negative or has
/// more than `id_length` digits, and with [`BlobError::InvalidConfig`] when
/// the parameters themselves are unusable.
pub fn shard_path(id: i64, id_length: u32, nesting_depth: u32) -> BlobResult<Vec<String>> {
    ShardLayout::new(id_length, nesting_depth)?.shard_path(id)
}
