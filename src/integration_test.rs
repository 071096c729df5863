#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use anyhow::Result;
    use bytes::Bytes;
    use proto_api::storage_pb::{
        file_service_client::FileServiceClient,
        DeleteRequest,
        DownloadRequest,
        UploadRequest,
    };
    use rand::RngCore;
    use tonic::{transport::Channel, Code};

    use crate::testing::TestService;

    const CHUNK_SIZE: usize = 32 * 1024;

    fn random_payload(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::rng().fill_bytes(&mut data);
        data
    }

    async fn upload(client: &mut FileServiceClient<Channel>, data: &[u8]) -> Result<i64> {
        let requests: Vec<UploadRequest> = data
            .chunks(10_000)
            .map(|chunk| UploadRequest {
                chunk: Bytes::copy_from_slice(chunk),
            })
            .collect();
        let response = client.upload(futures::stream::iter(requests)).await?;
        Ok(response.into_inner().file_id)
    }

    async fn download(
        client: &mut FileServiceClient<Channel>,
        file_id: i64,
    ) -> Result<Vec<Bytes>, tonic::Status> {
        let mut stream = client
            .download(DownloadRequest { file_id })
            .await?
            .into_inner();
        let mut chunks = Vec::new();
        while let Some(message) = stream.message().await? {
            chunks.push(message.chunk);
        }
        Ok(chunks)
    }

    #[tokio::test]
    async fn test_upload_download_delete() -> Result<()> {
        let test_srv = TestService::new().await?;
        let mut client = test_srv.client().await?;

        let data = random_payload(100_000);
        let file_id = upload(&mut client, &data).await?;
        assert!((0..100_000).contains(&file_id));
        assert!(test_srv
            .service
            .blob_store
            .blob_path(file_id)?
            .is_file());

        let chunks = download(&mut client, file_id).await?;
        assert_eq!(chunks.len(), 4);
        assert!(chunks[..3].iter().all(|c| c.len() == CHUNK_SIZE));
        assert_eq!(chunks.concat(), data);

        let deleted = client.delete(DeleteRequest { file_id }).await?.into_inner();
        assert!(deleted.success);
        assert_eq!(test_srv.stored_files(), 0);

        let status = download(&mut client, file_id).await.unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "file not exists");

        let status = client.delete(DeleteRequest { file_id }).await.unwrap_err();
        assert_eq!(status.code(), Code::NotFound);

        drop(client);
        test_srv.stop().await
    }

    #[tokio::test]
    async fn test_empty_upload() -> Result<()> {
        let test_srv = TestService::new().await?;
        let mut client = test_srv.client().await?;

        let file_id = upload(&mut client, &[]).await?;
        let chunks = download(&mut client, file_id).await?;
        assert!(chunks.is_empty());
        assert_eq!(test_srv.stored_files(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_ids() -> Result<()> {
        let test_srv = TestService::new().await?;
        let mut client = test_srv.client().await?;

        let status = download(&mut client, 4242).await.unwrap_err();
        assert_eq!(status.code(), Code::NotFound);

        let status = client
            .delete(DeleteRequest { file_id: 4242 })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);

        for file_id in [-1, 100_000] {
            let status = download(&mut client, file_id).await.unwrap_err();
            assert_eq!(status.code(), Code::InvalidArgument);

            let status = client.delete(DeleteRequest { file_id }).await.unwrap_err();
            assert_eq!(status.code(), Code::InvalidArgument);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_uploads() -> Result<()> {
        let test_srv = TestService::new().await?;

        let mut handles = Vec::new();
        for i in 0..20u8 {
            let mut client = test_srv.client().await?;
            handles.push(tokio::spawn(async move {
                let data = vec![i; 5_000];
                let file_id = upload(&mut client, &data).await?;
                Ok::<_, anyhow::Error>((file_id, data))
            }));
        }

        let mut ids = HashSet::new();
        let mut client = test_srv.client().await?;
        for handle in handles {
            let (file_id, data) = handle.await??;
            assert!(ids.insert(file_id));
            assert_eq!(download(&mut client, file_id).await?.concat(), data);
        }
        assert_eq!(test_srv.stored_files(), 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_peer_outside_allow_list() -> Result<()> {
        let test_srv = TestService::with_allowed_ips(vec!["10.20.30.40".to_string()]).await?;
        let mut client = test_srv.client().await?;

        let status = client
            .upload(futures::stream::iter(vec![UploadRequest {
                chunk: Bytes::from_static(b"not welcome"),
            }]))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::PermissionDenied);
        assert_eq!(status.message(), "ip is not allowed");

        let status = download(&mut client, 1).await.unwrap_err();
        assert_eq!(status.code(), Code::PermissionDenied);

        let status = client
            .delete(DeleteRequest { file_id: 1 })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::PermissionDenied);

        assert_eq!(test_srv.stored_files(), 0);
        Ok(())
    }
}
