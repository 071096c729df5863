use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use blob_store::BlobStorageConfig;
use proto_api::storage_pb::file_service_client::FileServiceClient;
use tempfile::TempDir;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Channel;
use tracing::subscriber;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::{config::ServerConfig, service::Service};

/// A running file service on an ephemeral localhost port, backed by a
/// temporary blob root that is removed on drop.
pub struct TestService {
    pub service: Arc<Service>,
    pub addr: SocketAddr,
    server: JoinHandle<Result<()>>,
    _temp_dir: TempDir,
}

impl TestService {
    pub async fn new() -> Result<Self> {
        Self::with_allowed_ips(vec!["127.0.0.1".to_string(), "::1".to_string()]).await
    }

    pub async fn with_allowed_ips(allowed_ips: Vec<String>) -> Result<Self> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace"));
        let _ = subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(env_filter)),
        );

        let temp_dir = tempfile::tempdir()?;
        let cfg = ServerConfig {
            listen_addr_grpc: "127.0.0.1:0".to_string(),
            allowed_ips,
            blob_storage: BlobStorageConfig::new(
                temp_dir.path().join("blobs").to_string_lossy(),
                2,
                5,
            ),
            ..Default::default()
        };
        cfg.validate()?;
        let service = Arc::new(Service::new(cfg).await?);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn({
            let service = service.clone();
            async move { service.serve(TcpListenerStream::new(listener)).await }
        });

        Ok(Self {
            service,
            addr,
            server,
            _temp_dir: temp_dir,
        })
    }

    pub async fn client(&self) -> Result<FileServiceClient<Channel>> {
        Ok(FileServiceClient::connect(format!("http://{}", self.addr)).await?)
    }

    /// Number of blob files currently on disk.
    pub fn stored_files(&self) -> usize {
        fn count(dir: &std::path::Path) -> usize {
            std::fs::read_dir(dir)
                .unwrap()
                .map(|entry| {
                    let entry = entry.unwrap();
                    if entry.file_type().unwrap().is_dir() {
                        count(&entry.path())
                    } else {
                        1
                    }
                })
                .sum()
        }
        count(self.service.blob_store.root())
    }

    pub async fn stop(self) -> Result<()> {
        self.service.shutdown();
        self.server.await?
    }
}
