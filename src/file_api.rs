use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use blob_store::{BlobError, BlobStore, ChunkSink, StreamSource};
use bytes::Bytes;
use futures::TryStreamExt;
use proto_api::storage_pb::{
    file_service_server::FileService,
    DeleteRequest,
    DeleteResponse,
    DownloadRequest,
    DownloadResponse,
    UploadRequest,
    UploadResponse,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, Instrument};

/// Responses queued ahead of the client. Together with the one chunk the
/// reader holds, a download keeps at most two chunks in memory.
const DOWNLOAD_BUFFER: usize = 1;

pub struct FileApi {
    blob_store: Arc<BlobStore>,
}

impl FileApi {
    pub fn new(blob_store: Arc<BlobStore>) -> Self {
        Self { blob_store }
    }
}

/// Maps store failures onto the statuses clients see.
///
/// Internal faults are logged by the store and reported without detail.
fn to_status(err: BlobError) -> Status {
    match err {
        BlobError::InvalidIdentifier { .. } => Status::invalid_argument(err.to_string()),
        BlobError::NotFound { .. } => Status::not_found("file not exists"),
        _ => Status::internal("internal server error"),
    }
}

fn download_channel() -> (
    mpsc::Sender<Result<DownloadResponse, Status>>,
    mpsc::Receiver<Result<DownloadResponse, Status>>,
) {
    mpsc::channel(DOWNLOAD_BUFFER)
}

/// Feeds downloaded chunks into the response stream.
struct ResponseSink {
    tx: mpsc::Sender<Result<DownloadResponse, Status>>,
}

#[async_trait]
impl ChunkSink for ResponseSink {
    async fn send_chunk(&mut self, chunk: Bytes) -> anyhow::Result<()> {
        self.tx
            .send(Ok(DownloadResponse { chunk }))
            .await
            .map_err(|_| anyhow!("download stream closed by client"))
    }
}

#[tonic::async_trait]
impl FileService for FileApi {
    async fn upload(
        &self,
        request: Request<Streaming<UploadRequest>>,
    ) -> Result<Response<UploadResponse>, Status> {
        let mut source = StreamSource::new(request.into_inner().map_ok(|req| req.chunk));
        let id = self.blob_store.upload(&mut source).await.map_err(to_status)?;

        info!(file_id = %id, "file uploaded");
        Ok(Response::new(UploadResponse {
            file_id: id.as_i64(),
        }))
    }

    type DownloadStream = ReceiverStream<Result<DownloadResponse, Status>>;

    async fn download(
        &self,
        request: Request<DownloadRequest>,
    ) -> Result<Response<Self::DownloadStream>, Status> {
        let file_id = request.into_inner().file_id;
        // Resolve the blob first so a missing file fails the call itself
        // rather than the response stream.
        let reader = self.blob_store.open(file_id).await.map_err(to_status)?;

        let (tx, rx) = download_channel();
        tokio::spawn(
            async move {
                let mut sink = ResponseSink { tx: tx.clone() };
                if let Err(err) = reader.stream_to(&mut sink).await {
                    // Fails as well if the client is already gone.
                    let _ = tx.send(Err(to_status(err))).await;
                }
            }
            .in_current_span(),
        );

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        let file_id = request.into_inner().file_id;
        self.blob_store.delete(file_id).await.map_err(to_status)?;

        info!(file_id, "file deleted");
        Ok(Response::new(DeleteResponse { success: true }))
    }
}
