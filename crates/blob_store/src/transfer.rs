//! Chunk source and sink capabilities.
//!
//! The store never sees a concrete transport. Uploads pull from a
//! [`ChunkSource`] and downloads push into a [`ChunkSink`]; the transport layer
//! implements both against its own streaming primitives.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};

/// A lazy, finite, non-restartable sequence of byte chunks.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, or `Ok(None)` once the sender has cleanly finished.
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Bytes>>;
}

/// Accepts byte chunks in order.
#[async_trait]
pub trait ChunkSink: Send {
    async fn send_chunk(&mut self, chunk: Bytes) -> anyhow::Result<()>;
}

/// Adapts any fallible byte stream into a [`ChunkSource`].
pub struct StreamSource<S> {
    inner: S,
}

impl<S> StreamSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S, E> ChunkSource for StreamSource<S>
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
    E: Into<anyhow::Error>,
{
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Bytes>> {
        match self.inner.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

/// Collects everything into memory. Only sensible for small blobs and tests.
#[async_trait]
impl ChunkSink for Vec<u8> {
    async fn send_chunk(&mut self, chunk: Bytes) -> anyhow::Result<()> {
        self.extend_from_slice(&chunk);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    #[tokio::test]
    async fn test_stream_source_yields_then_ends() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"c"))];
        let mut source = StreamSource::new(stream::iter(chunks));

        assert_eq!(source.next_chunk().await.unwrap().unwrap(), "ab");
        assert_eq!(source.next_chunk().await.unwrap().unwrap(), "c");
        assert!(source.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_source_surfaces_errors() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"ab")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "peer went away",
            )),
        ];
        let mut source = StreamSource::new(stream::iter(chunks));

        assert!(source.next_chunk().await.unwrap().is_some());
        let err = source.next_chunk().await.unwrap_err();
        assert!(err.to_string().contains("peer went away"));
    }
}
