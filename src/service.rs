use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use blob_store::BlobStore;
use proto_api::{descriptor, storage_pb::file_service_server::FileServiceServer};
use tokio::{self, net::TcpListener, signal, sync::watch};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{allowlist::AllowList, config::ServerConfig, file_api::FileApi};

pub struct Service {
    pub config: ServerConfig,
    pub shutdown_tx: watch::Sender<()>,
    pub shutdown_rx: watch::Receiver<()>,
    pub blob_store: Arc<BlobStore>,
    pub allow_list: AllowList,
}

impl Service {
    /// Builds the blob store, creating the shard tree on disk. The server
    /// must not start if this fails.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let blob_store = Arc::new(
            BlobStore::new(config.blob_storage.clone())
                .await
                .context("error initializing blob store")?,
        );
        let allow_list = AllowList::new(config.allowed_ip_addrs()?);

        Ok(Self {
            config,
            shutdown_tx,
            shutdown_rx,
            blob_store,
            allow_list,
        })
    }

    pub async fn start(&self) -> Result<()> {
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal(shutdown_tx).await;
            info!("graceful shutdown signal received, shutting down server gracefully");
        });

        let addr_grpc: SocketAddr = self.config.listen_addr_grpc.parse()?;
        let listener = TcpListener::bind(addr_grpc)
            .await
            .with_context(|| format!("unable to bind grpc listener on {}", addr_grpc))?;
        info!("server grpc listening on {}", addr_grpc);

        self.serve(TcpListenerStream::new(listener)).await
    }

    /// Serves the file service on already accepted connections until a
    /// shutdown is signalled.
    pub async fn serve(&self, incoming: TcpListenerStream) -> Result<()> {
        let reflection_service = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(descriptor::STORAGE_FILE_DESCRIPTOR_SET)
            .build_v1()?;
        let file_service = FileServiceServer::with_interceptor(
            FileApi::new(self.blob_store.clone()),
            self.allow_list.clone(),
        );

        let mut shutdown_rx = self.shutdown_rx.clone();
        Server::builder()
            .layer(TraceLayer::new_for_grpc())
            .add_service(file_service)
            .add_service(reflection_service)
            .serve_with_incoming_shutdown(incoming, async move {
                shutdown_rx.changed().await.ok();
            })
            .await?;

        info!("grpc server stopped");
        Ok(())
    }

    pub fn shutdown(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("server already shut down");
        }
    }
}

async fn shutdown_signal(shutdown_tx: watch::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
        },
        _ = terminate => {
        },
    }
    if shutdown_tx.send(()).is_err() {
        warn!("no server left to shut down");
    }
    info!("signal received, shutting down server gracefully");
}
