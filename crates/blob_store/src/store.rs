//! Sharded filesystem blob store.
//!
//! Uploads get a freshly allocated numeric id, downloads and deletes address
//! blobs by that id. Bytes are streamed chunk by chunk between the caller's
//! [`ChunkSource`]/[`ChunkSink`] and the blob file, so memory use per request
//! is bounded by one chunk regardless of blob size.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, error, info, warn};

use crate::{
    allocator::IdAllocator,
    config::BlobStorageConfig,
    metrics::BlobMetrics,
    sharding::{BlobId, ShardLayout, ShardLocator},
    transfer::{ChunkSink, ChunkSource},
    tree::create_shard_tree,
    BlobError,
    BlobResult,
};

/// How many times an upload asks for a new id after losing an
/// exclusive-create race before giving up.
const MAX_CREATE_ATTEMPTS: usize = 16;

pub struct BlobStore {
    locator: ShardLocator,
    allocator: IdAllocator,
    chunk_size: usize,
    metrics: BlobMetrics,
}

impl BlobStore {
    /// Validates `config` and creates the shard tree before returning.
    ///
    /// The store must not serve requests until this has succeeded.
    pub async fn new(config: BlobStorageConfig) -> BlobResult<Self> {
        config.validate()?;
        let layout = config.layout()?;
        let locator = ShardLocator::new(config.root(), layout, config.extension.clone());
        create_shard_tree(locator.root(), layout.nesting_depth()).await?;
        info!(
            root = %locator.root().display(),
            id_length = layout.id_length(),
            nesting_depth = layout.nesting_depth(),
            extension = locator.extension(),
            "blob store ready"
        );

        Ok(Self {
            allocator: IdAllocator::new(locator.clone()),
            locator,
            chunk_size: config.chunk_size,
            metrics: BlobMetrics::global(),
        })
    }

    pub fn layout(&self) -> &ShardLayout {
        self.locator.layout()
    }

    pub fn root(&self) -> &Path {
        self.locator.root()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Absolute path the blob for `id` is (or would be) stored at.
    pub fn blob_path(&self, id: i64) -> BlobResult<PathBuf> {
        let id = self.layout().validate_id(id)?;
        Ok(self.locator.blob_path(id))
    }

    pub async fn exists(&self, id: i64) -> BlobResult<bool> {
        let id = self.layout().validate_id(id)?;
        self.allocator.exists(id).await
    }

    /// Stores everything `source` yields under a newly allocated id.
    ///
    /// If the upload fails, or its future is dropped, after the blob file was
    /// created, the partially written file is removed again.
    ///
    /// The file is visible under its id while the upload is still writing. A
    /// `delete` of that id in the meantime succeeds and the upload still
    /// returns the id, now with no blob behind it; a concurrent `download`
    /// may stream a prefix of the content. Callers only learn the id once
    /// `upload` returns, so this takes guessing an id that is not theirs.
    pub async fn upload<S>(&self, source: &mut S) -> BlobResult<BlobId>
    where
        S: ChunkSource + ?Sized,
    {
        const OP: &str = "upload";
        let _timer = self.metrics.timer(OP);

        let result = self.upload_blob(source).await;
        self.observe(OP, None, result).map(|(id, written)| {
            self.metrics.record_bytes(OP, written);
            debug!(blob_id = %id, bytes = written, "uploaded blob");
            id
        })
    }

    /// Streams the blob stored under `id` into `sink`, returning the number
    /// of bytes sent.
    pub async fn download<K>(&self, id: i64, sink: &mut K) -> BlobResult<u64>
    where
        K: ChunkSink + ?Sized,
    {
        let reader = self.open(id).await?;
        reader.stream_to(sink).await
    }

    /// Resolves and opens the blob for `id` without sending anything yet.
    ///
    /// Lets a transport report `NotFound` or `InvalidIdentifier` before it
    /// commits to a response stream.
    pub async fn open(&self, id: i64) -> BlobResult<BlobReader> {
        let result = self.open_blob(id).await;
        self.observe("download", Some(id), result)
    }

    /// Removes the blob stored under `id`.
    ///
    /// Deleting an id with no blob is an error, including a second delete of
    /// the same id.
    pub async fn delete(&self, id: i64) -> BlobResult<()> {
        const OP: &str = "delete";
        let _timer = self.metrics.timer(OP);

        let result = self.delete_blob(id).await;
        self.observe(OP, Some(id), result)
    }

    async fn upload_blob<S>(&self, source: &mut S) -> BlobResult<(BlobId, u64)>
    where
        S: ChunkSource + ?Sized,
    {
        let (id, file, partial) = self.reserve().await?;
        let written = write_chunks(file, source, partial.path()).await?;
        partial.commit();
        Ok((id, written))
    }

    async fn open_blob(&self, id: i64) -> BlobResult<BlobReader> {
        let id = self.layout().validate_id(id)?;
        if !self.allocator.exists(id).await? {
            return Err(BlobError::NotFound { id: id.get() });
        }
        let path = self.locator.blob_path(id);
        let file = File::open(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                BlobError::NotFound { id: id.get() }
            } else {
                BlobError::io("open blob", path.clone(), e)
            }
        })?;
        Ok(BlobReader {
            id,
            path,
            file,
            chunk_size: self.chunk_size,
            metrics: self.metrics.clone(),
        })
    }

    async fn delete_blob(&self, id: i64) -> BlobResult<()> {
        let id = self.layout().validate_id(id)?;
        if !self.allocator.exists(id).await? {
            return Err(BlobError::NotFound { id: id.get() });
        }
        let path = self.locator.blob_path(id);
        tokio::fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                BlobError::NotFound { id: id.get() }
            } else {
                BlobError::io("remove blob", path.clone(), e)
            }
        })?;
        debug!(blob_id = %id, path = %path.display(), "deleted blob");
        Ok(())
    }

    /// Allocates an id and exclusively creates its file.
    ///
    /// Another upload may have been handed the same id by the allocator; the
    /// exclusive create lets exactly one of them win and the others retry.
    async fn reserve(&self) -> BlobResult<(BlobId, File, PartialBlob)> {
        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let id = self.allocator.allocate().await?;
            let path = self.locator.blob_path(id);
            match create_exclusive(path.clone()).await {
                Ok((file, partial)) => return Ok((id, file, partial)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!(blob_id = %id, attempt, "blob id taken concurrently, retrying");
                }
                Err(e) => return Err(BlobError::io("create blob", path, e)),
            }
        }
        Err(BlobError::Conflict {
            attempts: MAX_CREATE_ATTEMPTS,
        })
    }

    fn observe<T>(
        &self,
        op: &'static str,
        id: Option<i64>,
        result: BlobResult<T>,
    ) -> BlobResult<T> {
        if let Err(e) = &result {
            if e.is_internal() {
                self.metrics.record_error(op);
                error!(op, blob_id = ?id, error = %e, "blob operation failed");
            } else {
                warn!(op, blob_id = ?id, error = %e, "blob operation rejected");
            }
        }
        result
    }
}

/// An opened blob, ready to be streamed out.
pub struct BlobReader {
    id: BlobId,
    path: PathBuf,
    file: File,
    chunk_size: usize,
    metrics: BlobMetrics,
}

impl BlobReader {
    pub fn id(&self) -> BlobId {
        self.id
    }

    /// Pushes the file into `sink` in order, in chunks of `chunk_size` bytes
    /// (only the last chunk may be shorter). An empty blob sends nothing.
    pub async fn stream_to<K>(mut self, sink: &mut K) -> BlobResult<u64>
    where
        K: ChunkSink + ?Sized,
    {
        const OP: &str = "download";
        let _timer = self.metrics.timer(OP);

        let mut buffer = vec![0u8; self.chunk_size];
        let mut sent = 0u64;
        let result = loop {
            let filled = match read_full(&mut self.file, &mut buffer).await {
                Ok(filled) => filled,
                Err(e) => break Err(BlobError::io("read blob", self.path.clone(), e)),
            };
            if filled == 0 {
                break Ok(());
            }
            if let Err(e) = sink
                .send_chunk(Bytes::copy_from_slice(&buffer[..filled]))
                .await
            {
                break Err(BlobError::transport(OP, e));
            }
            sent += filled as u64;
            if filled < buffer.len() {
                break Ok(());
            }
        };

        match result {
            Ok(()) => {
                self.metrics.record_bytes(OP, sent);
                debug!(blob_id = %self.id, bytes = sent, "downloaded blob");
                Ok(sent)
            }
            Err(e) => {
                self.metrics.record_error(OP);
                error!(blob_id = %self.id, bytes = sent, error = %e, "blob download failed");
                Err(e)
            }
        }
    }
}

/// Exclusively creates the blob file at `path`.
///
/// The file and its cleanup guard are created together on the blocking pool,
/// so an upload dropped while the create is in flight still removes the file.
async fn create_exclusive(path: PathBuf) -> std::io::Result<(File, PartialBlob)> {
    tokio::task::spawn_blocking(move || -> std::io::Result<(File, PartialBlob)> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok((File::from_std(file), PartialBlob::new(path)))
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Reads until `buf` is full or the file ends. Returns the filled length.
async fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

async fn write_chunks<S>(mut file: File, source: &mut S, path: &Path) -> BlobResult<u64>
where
    S: ChunkSource + ?Sized,
{
    let mut written = 0u64;
    while let Some(chunk) = source
        .next_chunk()
        .await
        .map_err(|e| BlobError::transport("upload", e))?
    {
        if chunk.is_empty() {
            continue;
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| BlobError::io("write blob", path, e))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| BlobError::io("flush blob", path, e))?;
    Ok(written)
}

/// Removes a freshly created blob file unless the upload committed it.
///
/// Runs on every exit path, including the upload future being dropped.
struct PartialBlob {
    path: PathBuf,
    committed: bool,
}

impl PartialBlob {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PartialBlob {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => warn!(path = %self.path.display(), "removed partially written blob"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => error!(
                path = %self.path.display(),
                error = %e,
                "failed to remove partially written blob"
            ),
        }
    }
}
