//! Sharded filesystem blob store keyed by random numeric ids.
//!
//! Every blob lives at a path derived purely from its id: the id is
//! left-padded with zeros to a fixed width and its leading digits become
//! directory names, one per nesting level. With `id_length = 5` and
//! `nesting_depth = 4`, blob `10238` is stored at `1/0/2/3/10238.mp3` under
//! the store root.
//!
//! # Architecture
//!
//! - [`sharding`] maps ids to paths and validates client supplied ids.
//! - [`tree`] pre-creates every leaf directory at startup.
//! - [`IdAllocator`] draws random ids until it finds a free one.
//! - [`BlobStore`] ties these together and moves bytes between a
//!   [`ChunkSource`]/[`ChunkSink`] and the blob files.
//!
//! # Usage
//!
//! ```rust,no_run
//! use blob_store::{BlobStorageConfig, BlobStore};
//! use bytes::Bytes;
//! use futures::stream;
//!
//! # async fn example() -> Result<(), blob_store::BlobError> {
//! let config = BlobStorageConfig::new("/var/lib/storage/blobs", 4, 9);
//! let store = BlobStore::new(config).await?;
//!
//! let chunks = vec![Ok::<_, std::io::Error>(Bytes::from_static(b"hello"))];
//! let id = store
//!     .upload(&mut blob_store::StreamSource::new(stream::iter(chunks)))
//!     .await?;
//!
//! let mut contents = Vec::new();
//! store.download(id.as_i64(), &mut contents).await?;
//! store.delete(id.as_i64()).await?;
//! # Ok(())
//! # }
//! ```

mod allocator;
mod config;
mod error;
mod metrics;
pub mod sharding;
mod store;
mod transfer;
pub mod tree;

pub use allocator::{IdAllocator, Sampler};
pub use config::{BlobStorageConfig, DEFAULT_CHUNK_SIZE, default_blob_store_path};
pub use error::{BlobError, BlobResult};
pub use metrics::{BlobMetrics, Timer};
pub use sharding::{BlobId, ShardLayout, ShardLocator};
pub use store::{BlobReader, BlobStore};
pub use transfer::{ChunkSink, ChunkSource, StreamSource};
