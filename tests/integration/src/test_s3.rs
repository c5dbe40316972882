//! Transfers against a live S3-compatible endpoint.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
    use ruststack_transfer_core::{
        CopyRequest, MultipartClient, ObjectId, TransferConfig, TransferError, UploadRequest,
    };
    use ruststack_transfer_s3::{S3Transport, S3TransportConfig};

    use crate::{MIB, chunked, init_tracing, payload, unique_name};

    fn s3_client() -> aws_sdk_s3::Client {
        init_tracing();
        let settings = S3TransportConfig::from_env();
        let creds = Credentials::new("test", "test", None, None, "integration-test");
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region))
            .credentials_provider(creds)
            .endpoint_url(
                settings
                    .endpoint_url
                    .unwrap_or_else(|| "http://localhost:4566".to_owned()),
            )
            .force_path_style(settings.force_path_style)
            .build();
        aws_sdk_s3::Client::from_conf(config)
    }

    async fn create_bucket(client: &aws_sdk_s3::Client) -> String {
        let name = unique_name("transfer");
        client
            .create_bucket()
            .bucket(&name)
            .send()
            .await
            .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
        name
    }

    async fn read_object(client: &aws_sdk_s3::Client, bucket: &str, key: &str) -> Vec<u8> {
        client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .unwrap_or_else(|e| panic!("get_object {key}: {e}"))
            .body
            .collect()
            .await
            .unwrap_or_else(|e| panic!("read body {key}: {e}"))
            .into_bytes()
            .to_vec()
    }

    fn transfer_client(client: &aws_sdk_s3::Client) -> MultipartClient<S3Transport> {
        // The service rejects non-final parts below 5 MiB.
        let config = TransferConfig::builder()
            .minimum_part_size_in_bytes(5 * MIB as u64)
            .threshold_in_bytes(5 * MIB as u64)
            .build();
        MultipartClient::new(S3Transport::new(client.clone()), config)
            .unwrap_or_else(|e| panic!("config: {e}"))
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_upload_then_copy_in_parts() {
        let client = s3_client();
        let bucket = create_bucket(&client).await;
        let transfers = transfer_client(&client);
        let data = payload(12 * MIB + 123);

        let uploaded = transfers
            .upload(
                UploadRequest::new(ObjectId::new(&bucket, "source.bin")),
                chunked(data.clone(), 256 * 1024),
            )
            .await
            .unwrap_or_else(|e| panic!("upload: {e}"));
        assert_eq!(uploaded.parts_count, Some(3));

        let copied = transfers
            .copy(CopyRequest::new(
                ObjectId::new(&bucket, "source.bin"),
                ObjectId::new(&bucket, "dir/copy of source.bin"),
            ))
            .await
            .unwrap_or_else(|e| panic!("copy: {e}"));
        assert!(copied.etag.is_some_and(|e| e.ends_with("-3\"")));

        let body = read_object(&client, &bucket, "dir/copy of source.bin").await;
        assert_eq!(body, data.to_vec());
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_report_missing_copy_source() {
        let client = s3_client();
        let bucket = create_bucket(&client).await;
        let transfers = transfer_client(&client);

        let err = transfers
            .copy(CopyRequest::new(
                ObjectId::new(&bucket, "missing.bin"),
                ObjectId::new(&bucket, "copy.bin"),
            ))
            .await
            .expect_err("missing source");

        assert!(matches!(err, TransferError::Probe { .. }), "{err}");
    }
}
